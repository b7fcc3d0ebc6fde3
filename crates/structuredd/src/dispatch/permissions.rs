//! Permission configs read from the storage layer.
//!
//! A permission config lists the users allowed to read and to write tables
//! under a name prefix. Configs are stored as postcard blobs under
//! [`PERMISSION_PREFIX`] followed by the table-name prefix they govern; the
//! longest prefix of a table name that has a config decides.

use std::fmt;
use std::iter;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::ConfigReader;

use super::verify::VerificationError;

/// Key prefix under which permission configs are stored.
pub const PERMISSION_PREFIX: &str = "perm/";

/// Returns the config key governing tables whose names start with `prefix`.
pub fn permission_key(prefix: &str) -> String {
    format!("{PERMISSION_PREFIX}{prefix}")
}

/// Kind of access a method needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reading rows.
    Read,
    /// Modifying rows or tables.
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Users allowed to read and write a range of tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermConfig {
    /// Users allowed to read.
    pub read: Vec<String>,
    /// Users allowed to write.
    pub write: Vec<String>,
}

impl PermConfig {
    /// Reports whether `user` holds `access`.
    pub fn allows(&self, user: &str, access: Access) -> bool {
        let users = match access {
            Access::Read => &self.read,
            Access::Write => &self.write,
        };
        users.iter().any(|allowed| allowed == user)
    }

    /// Encodes the config as a storage blob.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error, which does not occur for well-formed
    /// configs.
    pub fn to_blob(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    /// Decodes a storage blob.
    ///
    /// # Errors
    ///
    /// Returns the deserialisation error when the blob is corrupt.
    pub fn from_blob(blob: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(blob)
    }
}

/// Decides whether a user may access a table.
pub trait Authorizer: Send + Sync {
    /// Checks that `user` holds `access` on `table`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::PermissionDenied`] when access is refused
    /// and [`VerificationError::PermissionLookup`] when the decision could not
    /// be made.
    fn authorize(&self, user: &str, table: &str, access: Access) -> Result<(), VerificationError>;
}

/// [`Authorizer`] backed by permission configs in the storage layer.
///
/// A table with no governing config is closed to everyone.
pub struct PermissionAuthorizer {
    reader: Arc<dyn ConfigReader>,
}

impl PermissionAuthorizer {
    /// Builds an authorizer reading configs through `reader`.
    pub fn new(reader: Arc<dyn ConfigReader>) -> Self {
        Self { reader }
    }

    /// Finds the config governing `table`, trying the longest prefix first.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::PermissionLookup`] when a read fails or a
    /// stored config is corrupt.
    pub fn lookup(&self, table: &str) -> Result<Option<PermConfig>, VerificationError> {
        let boundaries = table
            .char_indices()
            .map(|(index, _)| index)
            .chain(iter::once(table.len()));
        let mut prefixes: Vec<&str> = boundaries.map(|end| &table[..end]).collect();
        prefixes.reverse();

        for prefix in prefixes {
            let blob = self
                .reader
                .read_config(&permission_key(prefix))
                .map_err(|error| VerificationError::permission_lookup(table, error.to_string()))?;
            if let Some(blob) = blob {
                let config = PermConfig::from_blob(&blob).map_err(|error| {
                    VerificationError::permission_lookup(table, format!("corrupt config: {error}"))
                })?;
                return Ok(Some(config));
            }
        }
        Ok(None)
    }
}

impl Authorizer for PermissionAuthorizer {
    fn authorize(&self, user: &str, table: &str, access: Access) -> Result<(), VerificationError> {
        match self.lookup(table)? {
            Some(config) if config.allows(user, access) => Ok(()),
            _ => Err(VerificationError::permission_denied(user, table, access)),
        }
    }
}
