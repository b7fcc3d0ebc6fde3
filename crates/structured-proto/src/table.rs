//! Row, column and schema values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column values keyed by column name, in name order.
pub type Columns = BTreeMap<String, Value>;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    String(String),
    /// Signed 64-bit integer; the only type accepted by increments.
    Integer(i64),
    /// Boolean flag.
    Bool(bool),
}

impl Value {
    /// Returns the column type this value belongs to.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Bytes(_) => ColumnType::Bytes,
            Self::String(_) => ColumnType::String,
            Self::Integer(_) => ColumnType::Integer,
            Self::Bool(_) => ColumnType::Bool,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A row key together with some or all of its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Row key.
    pub key: String,
    /// Column values.
    #[serde(default)]
    pub columns: Columns,
}

impl Row {
    /// Builds a row from a key and `(name, value)` pairs.
    #[must_use]
    pub fn new<K, V>(key: impl Into<String>, columns: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Opaque bytes.
    Bytes,
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean flag.
    Bool,
}

/// A named, typed column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name, unique within the table.
    pub name: String,
    /// Declared value type.
    pub kind: ColumnType,
}

/// Shape of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Column declarations.
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

/// Reports whether `key` lies in the half-open range `[start, end)`.
///
/// An empty `end` leaves the range unbounded above.
#[must_use]
pub fn key_in_range(key: &str, start: &str, end: &str) -> bool {
    key >= start && (end.is_empty() || key < end)
}
