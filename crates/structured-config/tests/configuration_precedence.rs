//! Behavioural tests for configuration layer precedence.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use ortho_config::OrthoConfig;
use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use structured_config::{
    Config, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_REQUEST_BYTES, SocketEndpoint, default_api_prefix,
    default_http_socket, default_log_filter, default_log_format, default_rpc_socket,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const RPC_SOCKET_VAR: &str = "STRUCTURED_RPC_SOCKET";

struct Harness {
    temp_dir: TempDir,
    config_lines: RefCell<Vec<String>>,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _env_guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let harness = Self {
            temp_dir,
            config_lines: RefCell::new(Vec::new()),
            cli_args: RefCell::new(vec![OsString::from("structuredd")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env_guard: guard,
        };
        harness.clear_env(RPC_SOCKET_VAR);
        harness.clear_env("STRUCTURED_CONFIG_PATH");
        harness
    }

    fn push_config_line(&self, line: String) {
        self.config_lines.borrow_mut().push(line);
    }

    fn write_config(&self) {
        let lines = self.config_lines.borrow();
        if lines.is_empty() {
            return;
        }
        let path = self.temp_dir.path().join("structured.toml");
        if let Err(error) = fs::write(&path, lines.join("\n")) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.insert(1, path.into_os_string());
        args.insert(1, OsString::from("--config-path"));
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // SAFETY: the harness holds ENV_MUTEX for its whole lifetime and
        // restores every override in `Drop`.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn clear_env(&self, key: &str) {
        let previous = std::env::var_os(key);
        // SAFETY: see `set_env`.
        unsafe { std::env::remove_var(key) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }
        self.write_config();
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            // SAFETY: ENV_MUTEX is still held; `_env_guard` drops after this.
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

fn parse_endpoint(socket: &str) -> SocketEndpoint {
    match socket.parse::<SocketEndpoint>() {
        Ok(endpoint) => endpoint,
        Err(error) => panic!("invalid socket '{socket}': {error}"),
    }
}

fn endpoint_toml(key: &str, endpoint: &SocketEndpoint) -> String {
    match endpoint {
        SocketEndpoint::Unix { path } => {
            format!("{key} = {{ transport = \"unix\", path = \"{path}\" }}")
        }
        SocketEndpoint::Tcp { host, port } => {
            format!("{key} = {{ transport = \"tcp\", host = \"{host}\", port = {port} }}")
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the RPC socket to \"{socket}\"")]
fn given_configuration_file(harness: &Harness, socket: String) {
    let endpoint = parse_endpoint(&socket);
    harness.push_config_line(endpoint_toml("rpc_socket", &endpoint));
}

#[given("a configuration file setting the batch limit to {limit}")]
fn given_batch_limit(harness: &Harness, limit: usize) {
    harness.push_config_line(format!("max_batch_size = {limit}"));
}

#[given("the environment overrides the RPC socket to \"{socket}\"")]
fn given_environment_override(harness: &Harness, socket: String) {
    harness.set_env(RPC_SOCKET_VAR, &socket);
}

#[when("the CLI sets the RPC socket to \"{socket}\"")]
fn when_cli_override(harness: &Harness, socket: String) {
    harness.push_cli_arg("--rpc-socket");
    harness.push_cli_arg(OsString::from(&socket));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the RPC socket to \"{socket}\"")]
fn then_resolved_socket(harness: &Harness, socket: String) {
    let config = harness.loaded_config();
    assert_eq!(config.rpc_socket(), &parse_endpoint(&socket));
}

#[then("loading the configuration resolves the batch limit to {limit}")]
fn then_resolved_batch_limit(harness: &Harness, limit: usize) {
    let config = harness.loaded_config();
    assert_eq!(config.max_batch_size(), limit);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.http_socket(), &default_http_socket());
    assert_eq!(config.rpc_socket(), &default_rpc_socket());
    assert_eq!(config.api_prefix(), default_api_prefix());
    assert_eq!(config.max_request_bytes(), DEFAULT_MAX_REQUEST_BYTES);
    assert_eq!(config.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert!(config.disabled_methods().is_empty());
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
