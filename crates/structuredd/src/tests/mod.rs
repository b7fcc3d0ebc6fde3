//! Test suites for the structured dispatch daemon.

mod bootstrap_behaviour;
mod support;
