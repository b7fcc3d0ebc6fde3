//! Foreground process lifecycle: bootstrap, serve, wait, stop.

mod shutdown;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

pub use self::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::storage::{ConfigReader, MemoryStore, Sender};
use crate::transport::ListenerError;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors that end a daemon run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Bootstrap failed before any surface was started.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// A surface failed to start or stopped with an error.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Waiting for the shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Runs the daemon with system collaborators until a termination signal.
///
/// Commands execute against an in-process [`MemoryStore`].
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap fails, a surface fails, or signal
/// handlers cannot be installed.
pub fn run_daemon() -> Result<(), RunError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal::new(),
        Arc::new(MemoryStore::new()),
    )
}

/// Runs the daemon with the supplied collaborators.
///
/// Blocks until `shutdown` fires, then stops both surfaces and waits for
/// their threads.
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap fails, a surface fails, or `shutdown`
/// fails.
pub fn run_daemon_with<S>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
    storage: Arc<S>,
) -> Result<(), RunError>
where
    S: Sender + ConfigReader + 'static,
{
    let daemon = bootstrap_with(loader, reporter, storage)?;
    let surfaces = daemon.serve()?;
    info!(
        target: PROCESS_TARGET,
        http = %surfaces.http_endpoint(),
        rpc = %surfaces.rpc_endpoint(),
        "daemon serving"
    );

    let waited = shutdown.wait();
    surfaces.shutdown();
    let joined = surfaces.join();
    waited?;
    joined?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
