//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use structured_proto::UnknownMethod;
use thiserror::Error;
use tracing::warn;

use structured_config::{Config, SocketEndpoint, SocketPreparationError};

use crate::dispatch::Dispatcher;
use crate::health::HealthReporter;
use crate::storage::{ConfigReader, Sender};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::http::{self, HttpAdapter, HttpHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener, Surface, rpc};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare {surface} socket: {source}")]
    Socket {
        /// Surface whose endpoint could not be prepared.
        surface: Surface,
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// A disabled method name does not name a method.
    #[error("invalid disabled method list: {source}")]
    Methods {
        /// The offending name.
        #[source]
        source: UnknownMethod,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the dispatcher shared by both surfaces.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds and starts the RPC and HTTP surfaces.
    ///
    /// The RPC surface comes up first; if the HTTP surface then fails, the
    /// RPC surface is stopped again before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when either surface cannot be bound or
    /// started.
    pub fn serve(&self) -> Result<Surfaces, ListenerError> {
        let (rpc, rpc_endpoint) = self.report(Surface::Rpc, self.start_rpc())?;
        let (http, http_endpoint) = match self.report(Surface::Http, self.start_http()) {
            Ok(started) => started,
            Err(error) => {
                rpc.shutdown();
                if let Err(join_error) = rpc.join() {
                    warn!(
                        target: BOOTSTRAP_TARGET,
                        error = %join_error,
                        "RPC surface did not stop cleanly after HTTP startup failed"
                    );
                }
                return Err(error);
            }
        };
        Ok(Surfaces {
            http,
            http_endpoint,
            rpc,
            rpc_endpoint,
        })
    }

    fn start_rpc(&self) -> Result<(ListenerHandle, SocketEndpoint), ListenerError> {
        let listener = SocketListener::bind(self.config.rpc_socket())?;
        let endpoint = listener.bound_endpoint();
        let server = rpc::build_server(
            Arc::clone(&self.dispatcher),
            self.config.max_request_bytes(),
        )?;
        let handle = listener.start(Arc::new(server))?;
        Ok((handle, endpoint))
    }

    fn start_http(&self) -> Result<(HttpHandle, SocketEndpoint), ListenerError> {
        let listener = SocketListener::bind(self.config.http_socket())?;
        let endpoint = listener.bound_endpoint();
        let router =
            HttpAdapter::from_config(Arc::clone(&self.dispatcher), &self.config).into_router();
        let handle = http::serve(listener, router)?;
        Ok((handle, endpoint))
    }

    fn report<T>(
        &self,
        surface: Surface,
        result: Result<(T, SocketEndpoint), ListenerError>,
    ) -> Result<(T, SocketEndpoint), ListenerError> {
        match &result {
            Ok((_, endpoint)) => self.reporter.listener_started(surface, endpoint),
            Err(error) => self.reporter.listener_failed(surface, error),
        }
        result
    }
}

/// Running network surfaces of a [`Daemon`].
pub struct Surfaces {
    http: HttpHandle,
    http_endpoint: SocketEndpoint,
    rpc: ListenerHandle,
    rpc_endpoint: SocketEndpoint,
}

impl Surfaces {
    /// Endpoint the HTTP surface is bound to, with ephemeral ports resolved.
    #[must_use]
    pub fn http_endpoint(&self) -> &SocketEndpoint {
        &self.http_endpoint
    }

    /// Endpoint the RPC surface is bound to, with ephemeral ports resolved.
    #[must_use]
    pub fn rpc_endpoint(&self) -> &SocketEndpoint {
        &self.rpc_endpoint
    }

    /// Asks both surfaces to stop accepting connections.
    pub fn shutdown(&self) {
        self.http.shutdown();
        self.rpc.shutdown();
    }

    /// Waits for both surfaces to stop.
    ///
    /// # Errors
    ///
    /// Returns the first surface failure; the other surface is still joined.
    pub fn join(self) -> Result<(), ListenerError> {
        let http = self.http.join();
        let rpc = self.rpc.join();
        http.and(rpc)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// `storage` serves both as the command sender and as the source of
/// permission configs.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry, socket
/// preparation or the method table fail; `reporter` sees the failure first.
pub fn bootstrap_with<S>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    storage: Arc<S>,
) -> Result<Daemon, BootstrapError>
where
    S: Sender + ConfigReader + 'static,
{
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    for (surface, endpoint) in [
        (Surface::Http, config.http_socket()),
        (Surface::Rpc, config.rpc_socket()),
    ] {
        if let Err(source) = endpoint.prepare_filesystem() {
            let error = BootstrapError::Socket { surface, source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    }

    let sender: Arc<dyn Sender> = storage.clone();
    let reader: Arc<dyn ConfigReader> = storage;
    let dispatcher = match Dispatcher::from_config(&config, sender, reader) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(source) => {
            let error = BootstrapError::Methods { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        dispatcher,
        telemetry,
        reporter,
    })
}
