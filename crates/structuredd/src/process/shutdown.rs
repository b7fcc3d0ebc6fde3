//! Termination signal handling.

use std::io;
use std::os::raw::c_int;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that stop the daemon by default.
pub const TERMINATION_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the foreground thread until the daemon should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown has been requested.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Failures while waiting for a shutdown request.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
    /// The signal iterator closed before any signal arrived.
    #[error("signal delivery ended before a shutdown request")]
    Closed,
}

/// Waits for one of a set of POSIX signals.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    signals: Vec<c_int>,
}

impl SystemShutdownSignal {
    /// Listens for [`TERMINATION_SIGNALS`].
    #[must_use]
    pub fn new() -> Self {
        Self::for_signals(TERMINATION_SIGNALS)
    }

    /// Listens for the given signal numbers instead.
    #[must_use]
    pub fn for_signals(signals: impl IntoIterator<Item = c_int>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
        }
    }
}

impl Default for SystemShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut pending =
            Signals::new(&self.signals).map_err(|source| ShutdownError::Install { source })?;
        let signal = pending.forever().next().ok_or(ShutdownError::Closed)?;
        info!(
            target: PROCESS_TARGET,
            signal,
            name = signal_name(signal).unwrap_or("unknown"),
            "shutdown signal received"
        );
        Ok(())
    }
}
