use crate::LogFormat;
use crate::socket::SocketEndpoint;

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

/// Default TCP port for the HTTP surface.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// TCP port used for RPC when Unix domain sockets are not available.
pub const DEFAULT_RPC_PORT: u16 = 26257;

/// Default path prefix of the HTTP surface.
pub const DEFAULT_API_PREFIX: &str = "/structured/";

/// Default cap on HTTP bodies and RPC frames (1 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Default cap on sub-commands per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 128;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default HTTP path prefix.
#[must_use]
pub fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_owned()
}

/// Default request size cap.
#[must_use]
pub fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

/// Default batch size cap.
#[must_use]
pub fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

/// HTTP listens on loopback by default.
#[must_use]
pub fn default_http_socket() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_HTTP_PORT)
}

/// Computes the default RPC endpoint: a per-user Unix socket where
/// available, loopback TCP elsewhere.
#[must_use]
pub fn default_rpc_socket() -> SocketEndpoint {
    default_rpc_socket_inner()
}

#[cfg(unix)]
fn default_rpc_socket_inner() -> SocketEndpoint {
    let mut base = runtime_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| {
            let mut fallback = Utf8PathBuf::from_path_buf(std::env::temp_dir())
                .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
            fallback.push(user_namespace());
            fallback
        });
    base.push("structured");
    SocketEndpoint::unix(base.join("structuredd.sock"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_rpc_socket_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_RPC_PORT)
}
