//! Layered configuration shared by the structured dispatch daemon and its
//! tooling.
//!
//! Values resolve in the usual `ortho_config` order: built-in defaults, then a
//! configuration file (`--config-path` or `STRUCTURED_CONFIG_PATH`), then
//! `STRUCTURED_*` environment variables, then command-line flags. The daemon
//! reads the resolved [`Config`] once at start-up; nothing in it is mutated
//! while serving.

mod defaults;
mod socket;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use defaults::{
    DEFAULT_API_PREFIX, DEFAULT_HTTP_PORT, DEFAULT_LOG_FILTER, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MAX_REQUEST_BYTES, DEFAULT_RPC_PORT, default_api_prefix, default_http_socket,
    default_log_filter, default_log_filter_string, default_log_format, default_max_batch_size,
    default_max_request_bytes, default_rpc_socket,
};
pub use socket::{EndpointRejection, SocketEndpoint, SocketParseError, SocketPreparationError};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "STRUCTURED")]
pub struct Config {
    /// Endpoint serving the path-routed HTTP surface.
    #[ortho_config(default = default_http_socket())]
    pub http_socket: SocketEndpoint,
    /// Endpoint serving the binary RPC surface.
    #[ortho_config(default = default_rpc_socket())]
    pub rpc_socket: SocketEndpoint,
    /// Path prefix stripped from HTTP request paths to obtain the method name.
    #[ortho_config(default = default_api_prefix())]
    pub api_prefix: String,
    /// Upper bound for an HTTP body or an RPC frame, in bytes.
    #[ortho_config(default = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
    /// Upper bound on the number of sub-commands in one `BatchTable` call.
    #[ortho_config(default = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,
    /// Method names removed from the dispatch table at start-up.
    #[serde(default)]
    pub disabled_methods: Vec<String>,
    /// Check callers against permission configs before execution.
    #[serde(default)]
    pub enforce_permissions: bool,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log events.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_socket: default_http_socket(),
            rpc_socket: default_rpc_socket(),
            api_prefix: default_api_prefix(),
            max_request_bytes: default_max_request_bytes(),
            max_batch_size: default_max_batch_size(),
            disabled_methods: Vec::new(),
            enforce_permissions: false,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint for the HTTP surface.
    #[must_use]
    pub fn http_socket(&self) -> &SocketEndpoint {
        &self.http_socket
    }

    /// Endpoint for the RPC surface.
    #[must_use]
    pub fn rpc_socket(&self) -> &SocketEndpoint {
        &self.rpc_socket
    }

    /// HTTP path prefix, normalised to begin and end with `/`.
    #[must_use]
    pub fn api_prefix(&self) -> String {
        normalise_prefix(&self.api_prefix)
    }

    /// Maximum accepted request size in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Maximum number of sub-commands accepted in a batch.
    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Method names that must not be routed.
    #[must_use]
    pub fn disabled_methods(&self) -> &[String] {
        &self.disabled_methods
    }

    /// Whether permission checks run during verification.
    #[must_use]
    pub fn enforce_permissions(&self) -> bool {
        self.enforce_permissions
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

fn normalise_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_owned();
    }
    format!("/{trimmed}/")
}
