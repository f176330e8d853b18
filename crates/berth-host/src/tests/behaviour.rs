//! Behaviour-driven tests for the guest mounting lifecycle.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::entry::LifecycleState;
use crate::error::HostError;
use crate::quirks::{QuirkBehaviour, QuirkRule, QuirksTable};
use crate::version::Version;

use super::{GuestScript, Harness, MountOutcome, base_url, v};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    harness: Harness,
    quirks: QuirksTable,
    outcome: Option<MountOutcome>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld {
        harness: Harness::new(),
        quirks: QuirksTable::default(),
        outcome: None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unquote(text: &str) -> &str {
    text.trim_matches('"')
}

fn version_list(text: &str) -> Vec<String> {
    unquote(text)
        .split(',')
        .map(|item| item.trim().to_owned())
        .collect()
}

fn add_guest(world: &mut TestWorld, guest_id: &str, versions: &str, script: &GuestScript) {
    let id = unquote(guest_id);
    let listed = version_list(versions);
    for version in &listed {
        world.harness.publish_version(id, version, script.clone());
    }
    let refs: Vec<&str> = listed.iter().map(String::as_str).collect();
    world.harness.register(id, &refs);
}

fn finished(world: &TestWorld) -> Result<Version, HostError> {
    world
        .outcome
        .as_ref()
        .expect("no mount started")
        .borrow()
        .clone()
        .expect("mount still pending")
}

fn entry_state(world: &TestWorld, guest_id: &str) -> (LifecycleState, Option<Version>) {
    let slot = world
        .harness
        .host
        .slot(unquote(guest_id))
        .expect("guest registered");
    let entry = slot.entry();
    (entry.lifecycle_state(), entry.mounted_version().cloned())
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a quirk skipping the readiness wait for {guest_id}")]
fn given_quirk(world: &mut TestWorld, guest_id: String) {
    world.quirks.push(QuirkRule::new(
        unquote(&guest_id),
        QuirkBehaviour::SkipReadinessWait,
    ));
    world.harness = Harness::with_quirks(world.quirks.clone());
}

#[given("guest {guest_id} with released versions {versions}")]
fn given_guest(world: &mut TestWorld, guest_id: String, versions: String) {
    add_guest(world, &guest_id, &versions, &GuestScript::modern());
}

#[given("legacy guest {guest_id} with released versions {versions}")]
fn given_legacy_guest(world: &mut TestWorld, guest_id: String, versions: String) {
    add_guest(world, &guest_id, &versions, &GuestScript::legacy());
}

#[given("silent guest {guest_id} with released versions {versions}")]
fn given_silent_guest(world: &mut TestWorld, guest_id: String, versions: String) {
    add_guest(world, &guest_id, &versions, &GuestScript::modern().silent());
}

#[given("guest {guest_id} has been mounted at {major}.{minor}")]
fn given_mounted(world: &mut TestWorld, guest_id: String, major: u32, minor: u32) {
    world
        .harness
        .mount(unquote(&guest_id), major, minor)
        .expect("initial mount succeeds");
}

#[given("loading {script} of {guest_id} at {version} fails")]
fn given_failing_script(world: &mut TestWorld, script: String, guest_id: String, version: String) {
    let url = format!(
        "{}{}",
        base_url(unquote(&guest_id), unquote(&version)),
        unquote(&script)
    );
    world.harness.loader.fail_on(&url);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("guest {guest_id} is mounted at {major}.{minor}")]
fn when_mounted(world: &mut TestWorld, guest_id: String, major: u32, minor: u32) {
    let outcome = world
        .harness
        .spawn_mount(unquote(&guest_id), major, minor);
    world.outcome = Some(outcome);
}

#[when("guest {guest_id} starts mounting at {major}.{minor}")]
fn when_starts_mounting(world: &mut TestWorld, guest_id: String, major: u32, minor: u32) {
    when_mounted(world, guest_id, major, minor);
}

#[when("guest {guest_id} at {version} signals readiness")]
fn when_signals_ready(world: &mut TestWorld, guest_id: String, version: String) {
    world
        .harness
        .guest(unquote(&guest_id), unquote(&version))
        .signal_ready();
    world.harness.pool.run_until_stalled();
}

#[when("guest {guest_id} is unmounted")]
fn when_unmounted(world: &mut TestWorld, guest_id: String) {
    world
        .harness
        .host
        .unmount(unquote(&guest_id))
        .expect("guest registered");
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the mount resolves to {version}")]
fn then_resolves(world: &mut TestWorld, version: String) {
    let mounted = finished(world).expect("mount succeeded");
    assert_eq!(mounted, v(unquote(&version)));
}

#[then("the mount is still pending")]
fn then_pending(world: &mut TestWorld) {
    let outcome = world.outcome.as_ref().expect("no mount started");
    assert!(outcome.borrow().is_none(), "mount finished early");
}

#[then("the mount fails with {kind}")]
fn then_fails(world: &mut TestWorld, kind: String) {
    let err = finished(world).expect_err("expected mount failure");
    match unquote(&kind) {
        "version_not_found" => assert!(
            matches!(err, HostError::VersionNotFound { .. }),
            "expected VersionNotFound, got: {err}"
        ),
        "resource_load" => assert!(
            matches!(err, HostError::ResourceLoad { .. }),
            "expected ResourceLoad, got: {err}"
        ),
        other => panic!("unsupported error kind: '{other}'"),
    }
}

#[then("guest {guest_id} is ready at {version}")]
fn then_ready_at(world: &mut TestWorld, guest_id: String, version: String) {
    let (state, mounted) = entry_state(world, &guest_id);
    assert_eq!(state, LifecycleState::Ready);
    assert_eq!(mounted, Some(v(unquote(&version))));
}

#[then("guest {guest_id} is in state {state}")]
fn then_in_state(world: &mut TestWorld, guest_id: String, state: String) {
    let expected: LifecycleState = unquote(&state).parse().expect("known state");
    let (actual, mounted) = entry_state(world, &guest_id);
    assert_eq!(actual, expected);
    assert!(mounted.is_none());
}

#[then("{count} code resources were loaded")]
fn then_loaded(world: &mut TestWorld, count: usize) {
    assert_eq!(world.harness.loader.loaded_urls().len(), count);
}

#[then("{count} code resources were removed")]
fn then_removed(world: &mut TestWorld, count: usize) {
    assert_eq!(world.harness.loader.removed().len(), count);
}

#[then("the guest {guest_id} at {version} was mounted {count} time")]
fn then_mounted_times(world: &mut TestWorld, guest_id: String, version: String, count: usize) {
    let guest = world.harness.guest(unquote(&guest_id), unquote(&version));
    assert_eq!(guest.mount_count(), count);
}

#[then("the negotiated protocol version of {guest_id} is {protocol}")]
fn then_protocol(world: &mut TestWorld, guest_id: String, protocol: u32) {
    let slot = world
        .harness
        .host
        .slot(unquote(&guest_id))
        .expect("guest registered");
    assert_eq!(slot.dispatcher().negotiated_protocol_version(), protocol);
}

#[then("no problems were reported")]
fn then_no_problems(world: &mut TestWorld) {
    let problems = world.harness.sink.problems();
    assert!(problems.is_empty(), "unexpected reports: {problems:?}");
}

#[then("guest {guest_id} still lists {count} available versions")]
fn then_available(world: &mut TestWorld, guest_id: String, count: usize) {
    let slot = world
        .harness
        .host
        .slot(unquote(&guest_id))
        .expect("guest registered");
    assert_eq!(slot.entry().id(), unquote(&guest_id));
    assert_eq!(slot.entry().available_versions().len(), count);
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "Mounting resolves, loads, and handshakes a guest"
)]
fn mount_end_to_end(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "Mounting another minor version unmounts the current one first"
)]
fn remount_on_version_change(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "Mounting the mounted version again does nothing"
)]
fn idempotent_mount(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "Mounting an unknown major version fails without changing state"
)]
fn unknown_major(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "A failing code resource aborts the mount"
)]
fn failing_code_resource(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "A legacy guest covered by a quirk skips the readiness wait"
)]
fn legacy_quirk(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "A silent guest keeps the mount pending until it signals readiness"
)]
fn silent_guest(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/guest_mounting.feature",
    name = "Unmounting resets the slot but keeps its identity"
)]
fn unmount_keeps_identity(world: TestWorld) {
    let _ = world;
}
