//! Call metadata shared by every request and response.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata carried by every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestHeader {
    /// Caller identity; empty for anonymous callers.
    pub user: String,
    /// Wall-clock timestamp in nanoseconds. Zero reads the most recent
    /// version and writes at the current time.
    pub timestamp: i64,
}

impl RequestHeader {
    /// Builds a header for the named user at the current time.
    #[must_use]
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            timestamp: 0,
        }
    }
}

/// Metadata carried by every response.
///
/// `error` is `None` exactly when the call fully succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseHeader {
    /// Timestamp at which the call was executed.
    pub timestamp: i64,
    /// Application-level failure, if any.
    pub error: Option<ApiError>,
}

impl ResponseHeader {
    /// Returns the recorded failure.
    #[must_use]
    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Reports whether the call succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Records a failure, replacing any earlier one.
    pub fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }

    /// Clears any recorded failure.
    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

/// Broad classification of an application-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The storage layer rejected or failed the operation.
    Storage,
    /// A conditional write found unexpected column values.
    ConditionFailed,
    /// The addressed table or row does not exist.
    NotFound,
    /// The storage layer could not be reached.
    Unavailable,
    /// The dispatch layer itself failed.
    Internal,
    /// Some sub-commands of a batch failed.
    BatchPartial,
}

impl ErrorClass {
    /// Returns the wire name of the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::ConditionFailed => "condition_failed",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
            Self::BatchPartial => "batch_partial",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure recorded in a [`ResponseHeader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{class}: {message}")]
pub struct ApiError {
    /// Human-readable description.
    pub message: String,
    /// Classification of the failure.
    pub class: ErrorClass,
}

impl ApiError {
    /// Builds an error of the given class.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class,
        }
    }

    /// Builds an [`ErrorClass::Internal`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, message)
    }
}
