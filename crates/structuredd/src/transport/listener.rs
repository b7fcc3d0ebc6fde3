//! Socket binding and the connection accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use structured_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};
#[cfg(unix)]
use super::errors::StaleSocketStep;

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const IDLE_POLL: Duration = Duration::from_millis(25);
const ERROR_POLL: Duration = Duration::from_millis(150);
const CONNECTION_THREAD: &str = concat!(env!("CARGO_PKG_NAME"), "-conn");

/// A bound transport socket that has not started serving yet.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
}

/// Standard-library listener behind a [`SocketListener`].
#[derive(Debug)]
pub(crate) enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`, replacing a stale Unix socket file if one is left
    /// over from an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the address cannot be resolved or bound,
    /// or when a live process already serves the Unix socket.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(endpoint, host, *port)?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    socket: BoundSocket::Tcp(listener),
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    let listener = bind_unix(endpoint, path.as_std_path())?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        socket: BoundSocket::Unix(listener),
                    })
                }

                #[cfg(not(unix))]
                {
                    Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
        }
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Returns the bound TCP address; `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            BoundSocket::Unix(_) => None,
        }
    }

    /// Returns the endpoint clients should dial, with any ephemeral TCP port
    /// resolved.
    pub fn bound_endpoint(&self) -> SocketEndpoint {
        match (&self.endpoint, self.local_addr()) {
            (SocketEndpoint::Tcp { .. }, Some(addr)) => {
                SocketEndpoint::tcp(addr.ip().to_string(), addr.port())
            }
            (endpoint, _) => endpoint.clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (SocketEndpoint, BoundSocket) {
        (self.endpoint, self.socket)
    }

    /// Starts the accept loop on a background thread.
    ///
    /// Every accepted connection is served by `handler` on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NonBlocking`] when the socket cannot be polled.
    pub fn start(
        mut self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.socket.set_nonblocking() {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        let thread = thread::spawn(move || self.accept_until(&stopped, &handler));
        Ok(ListenerHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn accept_until(&mut self, stop: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        info!(target: LISTENER_TARGET, endpoint = %self.endpoint, "accepting connections");
        let mut repeated = None::<io::ErrorKind>;
        while !stop.load(Ordering::SeqCst) {
            match self.socket.accept() {
                Ok(Some(stream)) => {
                    repeated = None;
                    let handler = Arc::clone(handler);
                    let spawned = thread::Builder::new()
                        .name(CONNECTION_THREAD.to_owned())
                        .spawn(move || handler.handle(stream));
                    if let Err(error) = spawned {
                        warn!(target: LISTENER_TARGET, %error, "cannot spawn connection thread");
                    }
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    if repeated != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "accept failed");
                    }
                    repeated = Some(error.kind());
                    thread::sleep(ERROR_POLL);
                }
            }
        }
        info!(target: LISTENER_TARGET, endpoint = %self.endpoint, "stopped accepting");
        #[cfg(unix)]
        cleanup_unix_socket(&self.endpoint);
    }
}

impl BoundSocket {
    pub(crate) fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Accepts one pending connection as a blocking stream; `None` when no
    /// client is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Stops and joins the accept loop of a started [`SocketListener`].
///
/// Dropping the handle requests shutdown without waiting for it.
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. Open connections finish on their own.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to stop.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_tcp(endpoint: &SocketEndpoint, host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let resolve_error = |source| ListenerError::Resolve {
        endpoint: endpoint.to_string(),
        source,
    };
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| {
            resolve_error(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            ))
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[cfg(unix)]
fn bind_unix(endpoint: &SocketEndpoint, path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        replace_stale_socket(path)?;
    }
    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Deletes a socket file nobody answers on; refuses live sockets and
/// anything that is not a socket.
#[cfg(unix)]
fn replace_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let shown = || path.display().to_string();
    let failed = |step, source| ListenerError::StaleSocket {
        path: shown(),
        step,
        source,
    };

    let metadata =
        fs::symlink_metadata(path).map_err(|source| failed(StaleSocketStep::Inspect, source))?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotASocket { path: shown() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::SocketInUse { path: shown() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(|source| failed(StaleSocketStep::Remove, source))
        }
        Err(source) => Err(failed(StaleSocketStep::Probe, source)),
    }
}

/// Removes the socket file of a Unix endpoint after serving stops.
#[cfg(unix)]
pub(crate) fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            %error,
            %path,
            "failed to remove unix socket file"
        );
    }
}
