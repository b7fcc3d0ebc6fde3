//! Network surfaces of the daemon.
//!
//! Both surfaces bind through [`SocketListener`], so either can sit on a TCP
//! port or a Unix socket. The RPC surface runs a connection thread per client
//! through the listener's accept loop; the HTTP surface hands the bound
//! socket to an axum server on its own runtime thread.

mod errors;
mod handler;
pub mod http;
mod listener;
pub mod rpc;
#[cfg(test)]
mod test_utils;

use std::fmt;

pub use self::errors::ListenerError;
#[cfg(unix)]
pub use self::errors::StaleSocketStep;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Identifies one of the daemon's network surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Path-routed HTTP endpoint.
    Http,
    /// Method-registered binary RPC endpoint.
    Rpc,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Rpc => "rpc",
        })
    }
}
