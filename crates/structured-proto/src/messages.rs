//! Concrete request and response records, one pair per method.
//!
//! Every record is a flat struct with a header. Omitted fields decode to their
//! defaults, so `table` falls back to the default table (the empty name).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::api::{ReplyMismatch, StructuredRequest, StructuredResponse};
use crate::header::{RequestHeader, ResponseHeader};
use crate::table::{Columns, Row, TableSchema, Value, key_in_range};

/// Arguments of [`Method::CreateTable`](crate::Method::CreateTable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTableRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Schema of the new table.
    pub schema: TableSchema,
}

/// Reply to [`CreateTableRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTableResponse {
    /// Call metadata.
    pub header: ResponseHeader,
}

/// Arguments of [`Method::GetTableRow`](crate::Method::GetTableRow).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTableRowRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// Row key.
    pub row: String,
    /// Columns to return; empty returns every column.
    pub columns: Vec<String>,
}

/// Reply to [`GetTableRowRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTableRowResponse {
    /// Call metadata.
    pub header: ResponseHeader,
    /// The row, or `None` when it does not exist.
    pub row: Option<Row>,
}

/// Arguments of [`Method::PutTableRow`](crate::Method::PutTableRow).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PutTableRowRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// Row key.
    pub row: String,
    /// Columns to write.
    pub columns: Columns,
}

/// Reply to [`PutTableRowRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PutTableRowResponse {
    /// Call metadata.
    pub header: ResponseHeader,
}

/// Arguments of
/// [`Method::ConditionalPutTableRow`](crate::Method::ConditionalPutTableRow).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalPutTableRowRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// Row key.
    pub row: String,
    /// Columns to write when the condition holds.
    pub columns: Columns,
    /// Expected current values; `None` requires the column to be absent.
    pub expected: BTreeMap<String, Option<Value>>,
}

/// Reply to [`ConditionalPutTableRowRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalPutTableRowResponse {
    /// Call metadata.
    pub header: ResponseHeader,
    /// Current row contents, reported when the condition failed.
    pub actual: Option<Row>,
}

/// Arguments of [`Method::IncrementTableRow`](crate::Method::IncrementTableRow).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementTableRowRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// Row key.
    pub row: String,
    /// Deltas to add, keyed by column name.
    pub increments: BTreeMap<String, i64>,
}

/// Reply to [`IncrementTableRowRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementTableRowResponse {
    /// Call metadata.
    pub header: ResponseHeader,
    /// New value of every incremented column.
    pub columns: BTreeMap<String, i64>,
}

/// Arguments of [`Method::DeleteTableRow`](crate::Method::DeleteTableRow).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteTableRowRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// Row key.
    pub row: String,
}

/// Reply to [`DeleteTableRowRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteTableRowResponse {
    /// Call metadata.
    pub header: ResponseHeader,
}

/// Arguments of
/// [`Method::DeleteTableRowRange`](crate::Method::DeleteTableRowRange).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteTableRowRangeRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// First key to delete (inclusive).
    pub start_row: String,
    /// Key at which deletion stops (exclusive); empty deletes to the end.
    pub end_row: String,
}

/// Reply to [`DeleteTableRowRangeRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteTableRowRangeResponse {
    /// Call metadata.
    pub header: ResponseHeader,
    /// Number of rows removed.
    pub deleted: u64,
}

/// Arguments of [`Method::ScanTable`](crate::Method::ScanTable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTableRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Table name.
    pub table: String,
    /// First key to return (inclusive).
    pub start_row: String,
    /// Key at which the scan stops (exclusive); empty scans to the end.
    pub end_row: String,
    /// Columns to return; empty returns every column.
    pub columns: Vec<String>,
    /// Maximum number of rows; zero is unbounded.
    pub max_results: u64,
}

/// Reply to [`ScanTableRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTableResponse {
    /// Call metadata.
    pub header: ResponseHeader,
    /// Matching rows in key order.
    pub rows: Vec<Row>,
}

/// Arguments of [`Method::BatchTable`](crate::Method::BatchTable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTableRequest {
    /// Call metadata.
    pub header: RequestHeader,
    /// Sub-commands, executed concurrently.
    pub commands: Vec<StructuredRequest>,
}

/// Reply to [`BatchTableRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTableResponse {
    /// Call metadata; carries a summary error when any sub-command failed.
    pub header: ResponseHeader,
    /// One reply per sub-command, in submission order.
    pub results: Vec<StructuredResponse>,
}

fn check_row_key(row: &Row, expected: &str) -> Result<(), ReplyMismatch> {
    if row.key == expected {
        Ok(())
    } else {
        Err(ReplyMismatch::UnexpectedRow {
            expected: expected.to_owned(),
            actual: row.key.clone(),
        })
    }
}

fn check_projection(row: &Row, requested: &[String]) -> Result<(), ReplyMismatch> {
    if requested.is_empty() {
        return Ok(());
    }
    match row
        .columns
        .keys()
        .find(|column| !requested.iter().any(|name| name == *column))
    {
        Some(column) => Err(ReplyMismatch::UnrequestedColumn {
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

impl CreateTableResponse {
    pub(crate) fn check(&self, _request: &CreateTableRequest) -> Result<(), ReplyMismatch> {
        Ok(())
    }
}

impl GetTableRowResponse {
    pub(crate) fn check(&self, request: &GetTableRowRequest) -> Result<(), ReplyMismatch> {
        let Some(row) = &self.row else {
            return Ok(());
        };
        check_row_key(row, &request.row)?;
        check_projection(row, &request.columns)
    }
}

impl PutTableRowResponse {
    pub(crate) fn check(&self, _request: &PutTableRowRequest) -> Result<(), ReplyMismatch> {
        Ok(())
    }
}

impl ConditionalPutTableRowResponse {
    pub(crate) fn check(
        &self,
        request: &ConditionalPutTableRowRequest,
    ) -> Result<(), ReplyMismatch> {
        match &self.actual {
            Some(row) => check_row_key(row, &request.row),
            None => Ok(()),
        }
    }
}

impl IncrementTableRowResponse {
    pub(crate) fn check(&self, request: &IncrementTableRowRequest) -> Result<(), ReplyMismatch> {
        let returned: BTreeSet<&String> = self.columns.keys().collect();
        let requested: BTreeSet<&String> = request.increments.keys().collect();
        if returned == requested {
            Ok(())
        } else {
            Err(ReplyMismatch::IncrementColumns {
                expected: requested.len(),
                actual: returned.len(),
            })
        }
    }
}

impl DeleteTableRowResponse {
    pub(crate) fn check(&self, _request: &DeleteTableRowRequest) -> Result<(), ReplyMismatch> {
        Ok(())
    }
}

impl DeleteTableRowRangeResponse {
    pub(crate) fn check(&self, _request: &DeleteTableRowRangeRequest) -> Result<(), ReplyMismatch> {
        Ok(())
    }
}

impl ScanTableResponse {
    pub(crate) fn check(&self, request: &ScanTableRequest) -> Result<(), ReplyMismatch> {
        let returned = u64::try_from(self.rows.len()).unwrap_or(u64::MAX);
        if request.max_results > 0 && returned > request.max_results {
            return Err(ReplyMismatch::TooManyRows {
                limit: request.max_results,
                actual: returned,
            });
        }
        let mut previous: Option<&str> = None;
        for row in &self.rows {
            if !key_in_range(&row.key, &request.start_row, &request.end_row) {
                return Err(ReplyMismatch::RowOutOfRange {
                    row: row.key.clone(),
                });
            }
            if previous.is_some_and(|prior| prior >= row.key.as_str()) {
                return Err(ReplyMismatch::RowsOutOfOrder {
                    row: row.key.clone(),
                });
            }
            check_projection(row, &request.columns)?;
            previous = Some(&row.key);
        }
        Ok(())
    }
}

impl BatchTableResponse {
    pub(crate) fn check(&self, request: &BatchTableRequest) -> Result<(), ReplyMismatch> {
        if self.results.len() != request.commands.len() {
            return Err(ReplyMismatch::ResultCount {
                expected: request.commands.len(),
                actual: self.results.len(),
            });
        }
        for (index, (result, command)) in self.results.iter().zip(&request.commands).enumerate() {
            let outcome = if result.header().is_ok() {
                result.verify(command)
            } else {
                ReplyMismatch::check_method(command.method(), result.method())
            };
            outcome.map_err(|source| ReplyMismatch::BatchResult {
                index,
                source: Box::new(source),
            })?;
        }
        Ok(())
    }
}
