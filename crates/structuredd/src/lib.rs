//! Structured-command dispatch daemon for the table store.
//!
//! Clients reach the store through two surfaces that share one dispatcher.
//! The HTTP surface routes on the request path: the method name follows the
//! configured API prefix and the body carries the request record in the
//! binary or text encoding. The RPC surface binds every method as
//! `Server.<MethodName>` and moves postcard records in length-prefixed
//! frames. Configuration comes from [`structured_config`].
//!
//! Every call walks the same pipeline. The [`dispatch::MethodRegistry`]
//! resolves the method name to a freshly allocated request and response
//! pair, the [`dispatch::Verifier`] rejects malformed or unauthorised
//! requests, and the [`dispatch::Executor`] hands the request to the
//! storage [`storage::Sender`] and checks the reply it fills in. A
//! `BatchTable` call fans its sub-commands out to one worker each and
//! returns their replies in request order.
//!
//! Application failures travel in the response header on both surfaces.
//! Transport-level refusals (unknown method, undecodable body, failed
//! verification) are reported as HTTP status codes or RPC faults.

mod bootstrap;
pub mod dispatch;
mod health;
mod process;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, Surfaces, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    RunError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
