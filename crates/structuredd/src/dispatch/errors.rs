//! Transport-level failures of structured calls.
//!
//! These errors end a call before or around the pipeline and are reported
//! through the transport's own channel: an HTTP status or an RPC fault.
//! Failures inside the pipeline never appear here; they are recorded in the
//! reply header instead.

use structured_proto::{CodecError, Method};
use thiserror::Error;

use super::verify::VerificationError;

/// How a transport should classify a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The addressed method does not exist or is disabled.
    NotFound,
    /// The caller sent something the daemon cannot accept.
    Client,
    /// The daemon failed to handle an acceptable call.
    Server,
}

/// Errors that terminate a call at the transport boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request path lies outside the API prefix.
    #[error("no route for path '{path}'")]
    NoRoute { path: String },

    /// Method name is unknown or disabled.
    #[error("unknown method '{name}'")]
    UnknownMethod { name: String },

    /// Request content type is outside the allow-list.
    #[error("unsupported content type '{content_type}'")]
    UnsupportedContentType { content_type: String },

    /// No acceptable response encoding was offered.
    #[error("no acceptable response encoding in '{accept}'")]
    NotAcceptable { accept: String },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// A body of undeclared length grew past the maximum allowed size.
    #[error("request body exceeds {max_size} byte limit")]
    BodyTooLarge { max_size: usize },

    /// Request payload does not decode to the method's request.
    #[error("failed to decode {method} request: {source}")]
    Decode {
        method: Method,
        #[source]
        source: CodecError,
    },

    /// Request failed verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Reading the request body failed.
    #[error("failed to read request body: {message}")]
    ReadBody { message: String },

    /// Reply encoding failed.
    #[error("failed to encode {method} reply: {source}")]
    Encode {
        method: Method,
        #[source]
        source: CodecError,
    },

    /// Internal error (e.g., a worker task failed).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Returns how the transport should report this error.
    ///
    /// Routing failures are not-found, caller mistakes are client errors, and
    /// everything the caller could not have caused is a server error.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NoRoute { .. } | Self::UnknownMethod { .. } => FailureClass::NotFound,
            Self::UnsupportedContentType { .. }
            | Self::NotAcceptable { .. }
            | Self::RequestTooLarge { .. }
            | Self::BodyTooLarge { .. }
            | Self::Decode { .. } => FailureClass::Client,
            Self::Verification(error) if error.is_client_error() => FailureClass::Client,
            Self::Verification(_)
            | Self::ReadBody { .. }
            | Self::Encode { .. }
            | Self::Internal { .. } => FailureClass::Server,
        }
    }

    /// Creates a no-route error.
    pub fn no_route(path: impl Into<String>) -> Self {
        Self::NoRoute { path: path.into() }
    }

    /// Creates an unknown method error.
    pub fn unknown_method(name: impl Into<String>) -> Self {
        Self::UnknownMethod { name: name.into() }
    }

    /// Creates an unsupported content type error.
    pub fn unsupported_content_type(content_type: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }

    /// Creates a not-acceptable error.
    pub fn not_acceptable(accept: impl Into<String>) -> Self {
        Self::NotAcceptable {
            accept: accept.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates an error for a streamed body that outgrew `max_size`.
    pub fn body_too_large(max_size: usize) -> Self {
        Self::BodyTooLarge { max_size }
    }

    /// Creates a decode error.
    pub fn decode(method: Method, source: CodecError) -> Self {
        Self::Decode { method, source }
    }

    /// Creates a body read error.
    pub fn read_body(message: impl Into<String>) -> Self {
        Self::ReadBody {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(method: Method, source: CodecError) -> Self {
        Self::Encode { method, source }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
