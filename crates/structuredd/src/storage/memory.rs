//! In-process table store.
//!
//! Serves the dispatch pipeline when no external storage layer is attached:
//! the daemon binary runs on it, and the behavioural suites drive real rows
//! through it. Every operation takes the table lock once, so each call is
//! atomic with respect to the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use structured_proto::{
    ColumnType, Columns, ConditionalPutTableRowRequest, ConditionalPutTableRowResponse,
    CreateTableRequest, DeleteTableRowRangeRequest, DeleteTableRowRangeResponse,
    DeleteTableRowRequest, GetTableRowRequest, GetTableRowResponse, IncrementTableRowRequest,
    IncrementTableRowResponse, PutTableRowRequest, Row, ScanTableRequest, ScanTableResponse,
    StructuredRequest, StructuredResponse, TableSchema, Value, key_in_range,
};

use super::{ConfigReader, Sender, StorageError};

#[derive(Debug, Default)]
struct Table {
    schema: Option<TableSchema>,
    rows: BTreeMap<String, Columns>,
}

impl Table {
    fn with_schema(schema: TableSchema) -> Self {
        Self {
            schema: Some(schema),
            rows: BTreeMap::new(),
        }
    }

    fn check_columns<'a>(
        &self,
        columns: impl IntoIterator<Item = (&'a String, ColumnType)>,
    ) -> Result<(), StorageError> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        for (name, kind) in columns {
            match schema.columns.iter().find(|column| &column.name == name) {
                None => {
                    return Err(StorageError::failed(format!(
                        "table '{}' has no column '{name}'",
                        schema.name
                    )));
                }
                Some(column) if column.kind != kind => {
                    return Err(StorageError::failed(format!(
                        "column '{name}' of table '{}' holds {:?} values",
                        schema.name, column.kind
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Table store held entirely in memory.
///
/// The default table (the empty name) always exists and accepts any column.
/// Other tables must be created first and enforce their schema.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
    configs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store holding only the empty default table.
    #[must_use]
    pub fn new() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(String::new(), Table::default());
        Self {
            tables: RwLock::new(tables),
            configs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stores a configuration blob under `key`, replacing any earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the configuration map is unusable.
    pub fn put_config(&self, key: impl Into<String>, blob: Vec<u8>) -> Result<(), StorageError> {
        let mut configs = self.configs.write().map_err(|_| poisoned())?;
        configs.insert(key.into(), blob);
        Ok(())
    }

    fn read_tables<T>(
        &self,
        name: &str,
        op: impl FnOnce(&Table) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let table = tables.get(name).ok_or_else(|| missing_table(name))?;
        op(table)
    }

    fn write_tables<T>(
        &self,
        name: &str,
        op: impl FnOnce(&mut Table) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let table = tables.get_mut(name).ok_or_else(|| missing_table(name))?;
        op(table)
    }

    fn create_table(&self, request: &CreateTableRequest) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let name = &request.schema.name;
        if tables.contains_key(name) {
            return Err(StorageError::failed(format!(
                "table '{name}' already exists"
            )));
        }
        tables.insert(name.clone(), Table::with_schema(request.schema.clone()));
        Ok(())
    }

    fn get_row(
        &self,
        request: &GetTableRowRequest,
        reply: &mut GetTableRowResponse,
    ) -> Result<(), StorageError> {
        reply.row = self.read_tables(&request.table, |table| {
            Ok(table
                .rows
                .get(&request.row)
                .map(|columns| project(&request.row, columns, &request.columns)))
        })?;
        Ok(())
    }

    fn put_row(&self, request: &PutTableRowRequest) -> Result<(), StorageError> {
        self.write_tables(&request.table, |table| {
            table.check_columns(typed(&request.columns))?;
            let row = table.rows.entry(request.row.clone()).or_default();
            row.extend(request.columns.clone());
            Ok(())
        })
    }

    fn conditional_put_row(
        &self,
        request: &ConditionalPutTableRowRequest,
        reply: &mut ConditionalPutTableRowResponse,
    ) -> Result<(), StorageError> {
        self.write_tables(&request.table, |table| {
            table.check_columns(typed(&request.columns))?;
            let current = table.rows.get(&request.row);
            let mismatch = request.expected.iter().find(|&(name, expected)| {
                current.and_then(|columns| columns.get(name)) != expected.as_ref()
            });
            if let Some((name, _)) = mismatch {
                reply.actual = current.map(|columns| Row {
                    key: request.row.clone(),
                    columns: columns.clone(),
                });
                return Err(StorageError::condition_failed(format!(
                    "column '{name}' of row '{}' does not hold the expected value",
                    request.row
                )));
            }
            let row = table.rows.entry(request.row.clone()).or_default();
            row.extend(request.columns.clone());
            Ok(())
        })
    }

    fn increment_row(
        &self,
        request: &IncrementTableRowRequest,
        reply: &mut IncrementTableRowResponse,
    ) -> Result<(), StorageError> {
        reply.columns = self.write_tables(&request.table, |table| {
            table.check_columns(
                request
                    .increments
                    .keys()
                    .map(|name| (name, ColumnType::Integer)),
            )?;
            let current = table.rows.get(&request.row);
            let mut updated = BTreeMap::new();
            for (name, delta) in &request.increments {
                let base = match current.and_then(|columns| columns.get(name)) {
                    None => 0,
                    Some(Value::Integer(value)) => *value,
                    Some(_) => {
                        return Err(StorageError::failed(format!(
                            "column '{name}' of row '{}' is not an integer",
                            request.row
                        )));
                    }
                };
                let next = base.checked_add(*delta).ok_or_else(|| {
                    StorageError::failed(format!("incrementing column '{name}' overflows"))
                })?;
                updated.insert(name.clone(), next);
            }
            let row = table.rows.entry(request.row.clone()).or_default();
            for (name, value) in &updated {
                row.insert(name.clone(), Value::Integer(*value));
            }
            Ok(updated)
        })?;
        Ok(())
    }

    fn delete_row(&self, request: &DeleteTableRowRequest) -> Result<(), StorageError> {
        self.write_tables(&request.table, |table| {
            table.rows.remove(&request.row);
            Ok(())
        })
    }

    fn delete_range(
        &self,
        request: &DeleteTableRowRangeRequest,
        reply: &mut DeleteTableRowRangeResponse,
    ) -> Result<(), StorageError> {
        reply.deleted = self.write_tables(&request.table, |table| {
            let before = table.rows.len();
            table
                .rows
                .retain(|key, _| !key_in_range(key, &request.start_row, &request.end_row));
            Ok(u64::try_from(before - table.rows.len()).unwrap_or(u64::MAX))
        })?;
        Ok(())
    }

    fn scan(
        &self,
        request: &ScanTableRequest,
        reply: &mut ScanTableResponse,
    ) -> Result<(), StorageError> {
        let limit = usize::try_from(request.max_results).unwrap_or(usize::MAX);
        reply.rows = self.read_tables(&request.table, |table| {
            let rows = table
                .rows
                .range(request.start_row.clone()..)
                .take_while(|(key, _)| {
                    request.end_row.is_empty() || key.as_str() < request.end_row.as_str()
                })
                .map(|(key, columns)| project(key, columns, &request.columns));
            Ok(if limit == 0 {
                rows.collect()
            } else {
                rows.take(limit).collect()
            })
        })?;
        Ok(())
    }
}

impl Sender for MemoryStore {
    fn send(
        &self,
        request: &StructuredRequest,
        reply: &mut StructuredResponse,
    ) -> Result<(), StorageError> {
        match (request, &mut *reply) {
            (StructuredRequest::CreateTable(args), StructuredResponse::CreateTable(_)) => {
                self.create_table(args)?;
            }
            (StructuredRequest::GetTableRow(args), StructuredResponse::GetTableRow(out)) => {
                self.get_row(args, out)?;
            }
            (StructuredRequest::PutTableRow(args), StructuredResponse::PutTableRow(_)) => {
                self.put_row(args)?;
            }
            (
                StructuredRequest::ConditionalPutTableRow(args),
                StructuredResponse::ConditionalPutTableRow(out),
            ) => self.conditional_put_row(args, out)?,
            (
                StructuredRequest::IncrementTableRow(args),
                StructuredResponse::IncrementTableRow(out),
            ) => self.increment_row(args, out)?,
            (StructuredRequest::DeleteTableRow(args), StructuredResponse::DeleteTableRow(_)) => {
                self.delete_row(args)?;
            }
            (
                StructuredRequest::DeleteTableRowRange(args),
                StructuredResponse::DeleteTableRowRange(out),
            ) => self.delete_range(args, out)?,
            (StructuredRequest::ScanTable(args), StructuredResponse::ScanTable(out)) => {
                self.scan(args, out)?;
            }
            (request, reply) => {
                return Err(StorageError::failed(format!(
                    "cannot send a {} request with a {} reply",
                    request.method(),
                    reply.method()
                )));
            }
        }
        reply.header_mut().timestamp = execution_timestamp(request.header().timestamp);
        Ok(())
    }
}

impl ConfigReader for MemoryStore {
    fn read_config(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let configs = self.configs.read().map_err(|_| poisoned())?;
        Ok(configs.get(key).cloned())
    }
}

fn typed(columns: &Columns) -> impl Iterator<Item = (&String, ColumnType)> {
    columns
        .iter()
        .map(|(name, value)| (name, value.column_type()))
}

fn project(key: &str, columns: &Columns, requested: &[String]) -> Row {
    let columns = if requested.is_empty() {
        columns.clone()
    } else {
        let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        columns
            .iter()
            .filter(|(name, _)| wanted.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    };
    Row {
        key: key.to_owned(),
        columns,
    }
}

fn execution_timestamp(requested: i64) -> i64 {
    if requested != 0 {
        return requested;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_nanos()).ok())
        .unwrap_or(i64::MAX)
}

fn missing_table(name: &str) -> StorageError {
    StorageError::not_found(format!("table '{name}' does not exist"))
}

fn poisoned() -> StorageError {
    StorageError::unavailable("memory store lock poisoned")
}
