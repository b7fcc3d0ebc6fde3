//! Collaborators supplied by the storage layer.
//!
//! The dispatch pipeline never touches rows directly. It hands each call to a
//! [`Sender`] and reads permission blobs through a [`ConfigReader`]. Both are
//! shared by every concurrent call and every sub-command of a batch, so
//! implementations must be safe for concurrent use.

mod memory;

use thiserror::Error;

use structured_proto::{ApiError, ErrorClass, StructuredRequest, StructuredResponse};

pub use self::memory::MemoryStore;

/// Storage-layer entry point that executes a single non-batch call.
#[cfg_attr(test, mockall::automock)]
pub trait Sender: Send + Sync {
    /// Executes `request`, filling `reply` with the method's result.
    ///
    /// Implementations may leave partial results in `reply` when they fail;
    /// the pipeline records the failure in the reply header.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the storage layer rejects or fails the
    /// operation.
    fn send(
        &self,
        request: &StructuredRequest,
        reply: &mut StructuredResponse,
    ) -> Result<(), StorageError>;
}

/// Opaque key to blob lookups used for zone and permission configuration.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigReader: Send + Sync {
    /// Reads the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the lookup itself fails.
    fn read_config(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Failure reported by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The addressed table or row does not exist.
    #[error("{message}")]
    NotFound { message: String },
    /// A conditional write found unexpected values.
    #[error("{message}")]
    ConditionFailed { message: String },
    /// The storage layer could not be reached.
    #[error("{message}")]
    Unavailable { message: String },
    /// Any other rejection or failure.
    #[error("{message}")]
    Failed { message: String },
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a condition-failed error.
    pub fn condition_failed(message: impl Into<String>) -> Self {
        Self::ConditionFailed {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a generic storage failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns the header classification for this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::ConditionFailed { .. } => ErrorClass::ConditionFailed,
            Self::Unavailable { .. } => ErrorClass::Unavailable,
            Self::Failed { .. } => ErrorClass::Storage,
        }
    }
}

impl From<&StorageError> for ApiError {
    fn from(error: &StorageError) -> Self {
        Self::new(error.class(), error.to_string())
    }
}
