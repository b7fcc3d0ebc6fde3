//! Failures of the network surfaces.

#[cfg(unix)]
use std::fmt;
use std::io;

use thiserror::Error;

/// Step of replacing a leftover Unix socket file.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleSocketStep {
    /// Reading the file's metadata.
    Inspect,
    /// Connecting to find out whether a server still answers.
    Probe,
    /// Deleting the file.
    Remove,
}

#[cfg(unix)]
impl fmt::Display for StaleSocketStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inspect => "inspect",
            Self::Probe => "probe",
            Self::Remove => "remove",
        })
    }
}

/// Errors raised while binding, starting or stopping a surface.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The endpoint host has no usable address.
    #[error("cannot resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// The operating system refused the bind.
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot switch socket to non-blocking mode: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("{endpoint}: unix sockets are not available on this platform")]
    UnsupportedUnix { endpoint: String },
    /// A live server already answers on the socket path.
    #[cfg(unix)]
    #[error("{path} is served by another process")]
    SocketInUse { path: String },
    #[cfg(unix)]
    #[error("{path} exists and is not a socket")]
    NotASocket { path: String },
    #[cfg(unix)]
    #[error("cannot {step} leftover socket {path}: {source}")]
    StaleSocket {
        path: String,
        step: StaleSocketStep,
        #[source]
        source: io::Error,
    },
    /// The HTTP surface could not build its tokio runtime.
    #[error("cannot build the HTTP runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },
    /// The HTTP server stopped with an error.
    #[error("HTTP server failed: {source}")]
    Serve {
        #[source]
        source: io::Error,
    },
    /// Two RPC bindings share a name.
    #[error("RPC binding {name} is registered twice")]
    DuplicateBinding { name: String },
    #[error("surface thread panicked")]
    ThreadPanic,
}
