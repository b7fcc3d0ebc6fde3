//! Test harness utilities shared by the daemon behavioural suites.

mod config_loader;
mod reporter;
mod wire;
#[path = "world.rs"]
mod daemon_world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use daemon_world::{DaemonWorld, StepResult, world};
