//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use structured_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::transport::{ListenerError, Surface};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once a surface accepts connections on `endpoint`.
    fn listener_started(&self, surface: Surface, endpoint: &SocketEndpoint);

    /// Invoked when a surface cannot be brought up.
    fn listener_failed(&self, surface: Surface, error: &ListenerError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_started(&self, surface: Surface, endpoint: &SocketEndpoint) {
        (**self).listener_started(surface, endpoint);
    }

    fn listener_failed(&self, surface: Surface, error: &ListenerError) {
        (**self).listener_failed(surface, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            http_socket = %config.http_socket(),
            rpc_socket = %config.rpc_socket(),
            api_prefix = %config.api_prefix(),
            disabled_methods = ?config.disabled_methods(),
            enforce_permissions = config.enforce_permissions(),
            log_format = ?config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_started(&self, surface: Surface, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            %surface,
            %endpoint,
            "surface accepting connections"
        );
    }

    fn listener_failed(&self, surface: Surface, error: &ListenerError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "listener_failed",
            %surface,
            error = %error,
            "surface failed to start"
        );
    }
}
