//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;
use structured_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader serving HTTP on an ephemeral loopback port and RPC on a Unix socket
/// under a temporary directory.
pub struct TestConfigLoader {
    _socket_dir: TempDir,
    config: Config,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        let path = dir
            .path()
            .join("rpc.sock")
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned();
        let config = Config {
            http_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            rpc_socket: SocketEndpoint::unix(path),
            ..Config::default()
        };
        Self {
            _socket_dir: dir,
            config,
        }
    }

    /// Configuration handed out by [`ConfigLoader::load`], open for tweaks.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("structuredd"),
            OsString::from("--rpc-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
