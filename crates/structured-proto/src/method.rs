//! The closed set of structured table methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the fixed structured table operations.
///
/// Each method has exactly one textual name, used verbatim for routing on
/// both transports. Names are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Creates a table from a schema.
    CreateTable,
    /// Reads columns of a single row.
    GetTableRow,
    /// Writes columns of a single row.
    PutTableRow,
    /// Writes columns of a row when its current columns match expectations.
    ConditionalPutTableRow,
    /// Atomically adds deltas to integer columns.
    IncrementTableRow,
    /// Deletes a single row.
    DeleteTableRow,
    /// Deletes every row in a key range.
    DeleteTableRowRange,
    /// Reads the rows in a key range.
    ScanTable,
    /// Runs a sequence of sub-commands concurrently.
    BatchTable,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::CreateTable,
        Self::GetTableRow,
        Self::PutTableRow,
        Self::ConditionalPutTableRow,
        Self::IncrementTableRow,
        Self::DeleteTableRow,
        Self::DeleteTableRowRange,
        Self::ScanTable,
        Self::BatchTable,
    ];

    /// Returns the routing name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "CreateTable",
            Self::GetTableRow => "GetTableRow",
            Self::PutTableRow => "PutTableRow",
            Self::ConditionalPutTableRow => "ConditionalPutTableRow",
            Self::IncrementTableRow => "IncrementTableRow",
            Self::DeleteTableRow => "DeleteTableRow",
            Self::DeleteTableRowRange => "DeleteTableRowRange",
            Self::ScanTable => "ScanTable",
            Self::BatchTable => "BatchTable",
        }
    }

    /// Reports whether the method only reads table state.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::GetTableRow | Self::ScanTable)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == name)
            .ok_or_else(|| UnknownMethod(name.to_owned()))
    }
}

/// A name that matches no [`Method`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown method '{0}'")]
pub struct UnknownMethod(pub String);
