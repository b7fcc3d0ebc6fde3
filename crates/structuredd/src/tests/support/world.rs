//! Scenario world that bootstraps and serves a daemon over real sockets.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use serde::de::DeserializeOwned;
use structured_config::{Config, SocketEndpoint};
use structured_proto::{Encoding, StructuredRequest, TableRequest};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, Surfaces, bootstrap_with};
use crate::storage::MemoryStore;
use crate::transport::ListenerError;
use crate::transport::rpc::{RpcClient, RpcClientError, RpcFault, binding_name};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;
use super::wire::{self, HttpExchange};

pub type StepResult = Result<(), String>;

/// Scenario world shared across the daemon BDD suites.
pub struct DaemonWorld {
    loader: TestConfigLoader,
    failing_loader: bool,
    pub reporter: Arc<RecordingHealthReporter>,
    pub store: Arc<MemoryStore>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    surfaces: Option<Surfaces>,
    serve_error: Option<ListenerError>,
    http_reply: Option<HttpExchange>,
    rpc_reply: Option<Result<Vec<u8>, RpcClientError>>,
    /// Sub-commands of the batch under construction.
    pub batch: Vec<StructuredRequest>,
}

#[fixture]
pub fn world() -> RefCell<DaemonWorld> {
    RefCell::new(DaemonWorld::new())
}

impl DaemonWorld {
    /// Builds a world with a successful configuration loader.
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            failing_loader: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            store: Arc::new(MemoryStore::new()),
            daemon: None,
            bootstrap_error: None,
            surfaces: None,
            serve_error: None,
            http_reply: None,
            rpc_reply: None,
            batch: Vec::new(),
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.failing_loader = true;
    }

    /// Configuration the daemon will load.
    pub fn config_mut(&mut self) -> &mut Config {
        self.loader.config_mut()
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        let loader: &dyn ConfigLoader = if self.failing_loader {
            &FailingConfigLoader
        } else {
            &self.loader
        };
        match bootstrap_with(loader, self.reporter.clone(), Arc::clone(&self.store)) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Starts both surfaces of a bootstrapped daemon.
    pub fn serve(&mut self) -> StepResult {
        self.bootstrap();
        if self.surfaces.is_some() || self.serve_error.is_some() {
            return Ok(());
        }
        let daemon = self
            .daemon
            .as_ref()
            .ok_or_else(|| format!("bootstrap failed: {:?}", self.bootstrap_error))?;
        match daemon.serve() {
            Ok(surfaces) => self.surfaces = Some(surfaces),
            Err(error) => self.serve_error = Some(error),
        }
        Ok(())
    }

    /// Bootstraps and serves, failing the step when either stage fails.
    pub fn start(&mut self) -> StepResult {
        self.serve()?;
        match &self.serve_error {
            Some(error) => Err(format!("surfaces failed to start: {error}")),
            None => Ok(()),
        }
    }

    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub fn daemon_started(&self) -> bool {
        self.daemon.is_some()
    }

    fn surfaces(&self) -> Result<&Surfaces, String> {
        self.surfaces
            .as_ref()
            .ok_or_else(|| "daemon surfaces are not running".to_owned())
    }

    /// Posts `body` to the named method on the HTTP surface.
    pub fn post_http(
        &mut self,
        method: &str,
        encoding: Encoding,
        accept: Option<Encoding>,
        body: &[u8],
    ) -> StepResult {
        let prefix = self
            .daemon
            .as_ref()
            .map(|daemon| daemon.config().api_prefix())
            .ok_or("daemon was not bootstrapped")?;
        let path = format!("{prefix}{method}");
        let surfaces = self.surfaces()?;
        let exchange = wire::post(
            surfaces.http_endpoint(),
            &path,
            encoding.media_type(),
            accept.map(Encoding::media_type),
            body,
        )?;
        self.http_reply = Some(exchange);
        Ok(())
    }

    /// Encodes `args` and posts it to its method on the HTTP surface.
    pub fn post_typed<R: TableRequest>(&mut self, args: &R, encoding: Encoding) -> StepResult {
        let body = encoding.encode(args).map_err(|error| error.to_string())?;
        self.post_http(R::METHOD.as_str(), encoding, None, &body)
    }

    pub fn http_reply(&self) -> Result<&HttpExchange, String> {
        self.http_reply
            .as_ref()
            .ok_or_else(|| "no HTTP exchange recorded".to_owned())
    }

    /// Decodes the last HTTP reply body with `encoding`.
    pub fn http_body<T: DeserializeOwned>(&self, encoding: Encoding) -> Result<T, String> {
        encoding
            .decode(&self.http_reply()?.body)
            .map_err(|error| format!("reply body did not decode: {error}"))
    }

    pub fn rpc_endpoint(&self) -> Result<SocketEndpoint, String> {
        Ok(self.surfaces()?.rpc_endpoint().clone())
    }

    /// Calls the binding named `name` with a raw payload.
    pub fn call_rpc_raw(&mut self, name: &str, payload: Vec<u8>) -> StepResult {
        let endpoint = self.rpc_endpoint()?;
        let mut client = RpcClient::connect(&endpoint).map_err(|error| error.to_string())?;
        self.rpc_reply = Some(client.call_raw(name, payload));
        Ok(())
    }

    /// Calls the binding of `R`'s method.
    pub fn call_rpc<R: TableRequest>(&mut self, args: &R) -> StepResult {
        let payload = Encoding::Binary
            .encode(args)
            .map_err(|error| error.to_string())?;
        self.call_rpc_raw(&binding_name(R::METHOD), payload)
    }

    /// Decodes the last RPC reply.
    pub fn rpc_reply<T: DeserializeOwned>(&self) -> Result<T, String> {
        match &self.rpc_reply {
            Some(Ok(payload)) => Encoding::Binary
                .decode(payload)
                .map_err(|error| format!("RPC reply did not decode: {error}")),
            Some(Err(error)) => Err(format!("RPC call failed: {error}")),
            None => Err("no RPC call recorded".to_owned()),
        }
    }

    /// Returns the fault raised by the last RPC call.
    pub fn rpc_fault(&self) -> Result<&RpcFault, String> {
        match &self.rpc_reply {
            Some(Err(RpcClientError::Fault(fault))) => Ok(fault),
            Some(Err(error)) => Err(format!("RPC call failed without a fault: {error}")),
            Some(Ok(_)) => Err("RPC call succeeded unexpectedly".to_owned()),
            None => Err("no RPC call recorded".to_owned()),
        }
    }
}

impl Drop for DaemonWorld {
    fn drop(&mut self) {
        if let Some(surfaces) = self.surfaces.take() {
            surfaces.shutdown();
            let _ = surfaces.join();
        }
    }
}
