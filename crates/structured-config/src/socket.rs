//! Socket endpoints for the HTTP and RPC surfaces.
//!
//! Endpoints are written as URLs (`tcp://127.0.0.1:8080`,
//! `unix:///run/structured/structuredd.sock`) on the command line and in the
//! environment, and as tagged tables in configuration files.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Address one of the daemon's surfaces listens on.
///
/// In configuration files an endpoint is a table tagged by `transport`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Local socket file, the default for the RPC surface.
    Unix {
        /// Where the socket file is created.
        path: Utf8PathBuf,
    },
    /// Network listener, the default for the HTTP surface.
    Tcp {
        /// Interface name or address to bind.
        host: String,
        /// Port to bind; `0` asks the OS for a free one.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Endpoint for a socket file at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Endpoint for `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file path, or `None` for network endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Makes sure the directory that will hold a socket file exists and is
    /// private to the daemon's user (mode 0700 on Unix).
    ///
    /// Network endpoints need nothing and always succeed.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] for a bare file name or when the
    /// directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(socket) = self.unix_path() else {
            return Ok(());
        };
        let directory = socket
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: socket.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o700);

        match builder.create(directory.as_std_path()) {
            Err(source) if source.kind() != std::io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: directory.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let rejected = |reason| SocketParseError::Rejected {
            endpoint: input.to_owned(),
            reason,
        };
        match url.scheme() {
            "tcp" => {
                let host = url.host_str().ok_or_else(|| rejected(EndpointRejection::NoHost))?;
                let port = url.port().ok_or_else(|| rejected(EndpointRejection::NoPort))?;
                Ok(Self::tcp(host, port))
            }
            "unix" => match url.path() {
                "" | "/" => Err(rejected(EndpointRejection::NoPath)),
                path => Ok(Self::unix(path)),
            },
            _ => Err(rejected(EndpointRejection::Scheme)),
        }
    }
}

/// What is wrong with an endpoint URL that parsed as a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRejection {
    /// Neither `tcp://` nor `unix://`.
    Scheme,
    /// A `tcp://` endpoint without a host.
    NoHost,
    /// A `tcp://` endpoint without a port.
    NoPort,
    /// A `unix://` endpoint without a socket path.
    NoPath,
}

impl fmt::Display for EndpointRejection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Scheme => "surfaces listen on tcp:// or unix:// endpoints only",
            Self::NoHost => "the TCP endpoint names no interface to bind",
            Self::NoPort => "the TCP endpoint needs an explicit port (0 for any)",
            Self::NoPath => "the Unix endpoint names no socket file",
        })
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// The text is a URL but not a usable endpoint.
    #[error("invalid surface endpoint '{endpoint}': {reason}")]
    Rejected {
        /// Endpoint as written.
        endpoint: String,
        /// Which part is missing or unsupported.
        reason: EndpointRejection,
    },
    /// The text is not a URL at all.
    #[error("surface endpoint is not a URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised while getting a socket file's directory ready.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path is a bare file name.
    #[error("socket file '{path}' must sit inside a directory")]
    MissingParent {
        /// Configured socket path.
        path: Utf8PathBuf,
    },
    /// The socket directory could not be created.
    #[error("cannot create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that was being created.
        path: Utf8PathBuf,
        /// Filesystem failure.
        #[source]
        source: std::io::Error,
    },
}
