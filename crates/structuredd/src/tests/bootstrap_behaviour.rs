//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::bootstrap::BootstrapError;
use crate::transport::Surface;

use super::support::{self, DaemonWorld, HealthEvent, StepResult};

#[fixture]
fn world() -> RefCell<DaemonWorld> {
    support::world()
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<DaemonWorld>) {
    let _ = world;
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<DaemonWorld>) {
    world.borrow_mut().use_failing_loader();
}

#[given("the configuration disables the method \"{method}\"")]
fn given_disabled_method(world: &RefCell<DaemonWorld>, method: String) {
    world.borrow_mut().config_mut().disabled_methods.push(method);
}

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<DaemonWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("the daemon surfaces start")]
fn when_surfaces_start(world: &RefCell<DaemonWorld>) -> StepResult {
    world.borrow_mut().start()
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<DaemonWorld>) {
    let world = world.borrow();
    assert!(
        world.bootstrap_error().is_none(),
        "bootstrap error: {:?}",
        world.bootstrap_error()
    );
    assert!(world.daemon_started(), "daemon should have been initialised");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<DaemonWorld>) {
    assert!(
        world.borrow().bootstrap_error().is_some(),
        "bootstrap succeeded unexpectedly"
    );
}

#[then("bootstrap fails because the method list is invalid")]
fn then_bootstrap_rejects_methods(world: &RefCell<DaemonWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.bootstrap_error(), Some(BootstrapError::Methods { .. })),
        "expected a method list failure, got {:?}",
        world.bootstrap_error()
    );
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<DaemonWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapStarting),
        "bootstrap start event missing"
    );
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<DaemonWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapSucceeded),
        "bootstrap success event missing"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<DaemonWorld>) {
    let events = world.borrow().reporter.events();
    let failed = events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)));
    assert!(failed, "bootstrap failure event missing: {events:?}");
}

#[then("the reporter recorded the \"{surface}\" surface starting")]
fn then_reporter_surface(world: &RefCell<DaemonWorld>, surface: String) -> StepResult {
    let surface = parse_surface(&surface)?;
    let events = world.borrow().reporter.events();
    if events.contains(&HealthEvent::ListenerStarted(surface)) {
        Ok(())
    } else {
        Err(format!("{surface} start event missing: {events:?}"))
    }
}

#[scenario(path = "tests/features/daemon_bootstrap.feature")]
fn daemon_bootstrap(world: RefCell<DaemonWorld>) {
    let _ = world;
}

fn parse_surface(name: &str) -> Result<Surface, String> {
    match name {
        "http" => Ok(Surface::Http),
        "rpc" => Ok(Surface::Rpc),
        other => Err(format!("unknown surface '{other}'")),
    }
}
