//! Guest module lifecycle manager.
//!
//! The [`Mounter`] drives one guest slot through `INIT → LOADING → READY`:
//! it resolves the requested version, fetches the module descriptor, loads
//! the guest's code unless its interface is already resident, hands the
//! router's inbound entry point to the guest's mount function, registers
//! the returned call-handle with the dispatcher, and waits for the guest's
//! `APP_READY` signal. [`Mounter::unmount`] reverses each step.
//!
//! There is no timeout on the readiness wait. A guest that never signals
//! readiness and is not covered by the quirks table keeps its mount pending
//! until the slot is unmounted, which abandons the wait.
//!
//! Every mount and unmount starts a new attempt. A mount that finds its
//! attempt superseded when it resumes stops without touching the entry, the
//! readiness latch, or code it did not load itself.

mod readiness;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::entry::{LifecycleState, SharedEntry};
use crate::entrypoints;
use crate::error::{HandlerError, HostError};
use crate::host::HostServices;
use crate::loader::InterfaceKey;
use crate::protocol::APP_READY;
use crate::router::Router;
use crate::sink::MOUNTER_SOURCE;
use crate::version::{self, Version};

use self::readiness::ReadinessLatch;

/// Tracing target for lifecycle operations.
const MOUNTER_TARGET: &str = "berth_host::mounter";

/// Mounts and unmounts one guest.
///
/// The mounter holds its slot's router and dispatcher weakly. If either is
/// gone when a mount starts, the mount fails with
/// [`HostError::MissingCapability`] and the mounter disables itself.
pub struct Mounter {
    guest_id: String,
    entry: SharedEntry,
    router: Weak<Router>,
    dispatcher: Weak<Dispatcher>,
    readiness: Rc<ReadinessLatch>,
    attempt: Cell<u64>,
    services: HostServices,
    disabled: RefCell<Option<HostError>>,
}

impl Mounter {
    /// Creates a mounter for the guest described by `entry`.
    #[must_use]
    pub fn new(
        entry: SharedEntry,
        router: &Rc<Router>,
        dispatcher: &Rc<Dispatcher>,
        services: HostServices,
    ) -> Self {
        let guest_id = entry.borrow().id().to_owned();
        Self {
            guest_id,
            entry,
            router: Rc::downgrade(router),
            dispatcher: Rc::downgrade(dispatcher),
            readiness: Rc::default(),
            attempt: Cell::new(0),
            services,
            disabled: RefCell::new(None),
        }
    }

    /// Returns the guest this mounter manages.
    #[must_use]
    pub const fn guest_id(&self) -> &str {
        self.guest_id.as_str()
    }

    /// Returns `true` once a missing collaborator has disabled the mounter.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.borrow().is_some()
    }

    /// Installs the `APP_READY` handler on `router`.
    ///
    /// The handler moves a loading guest to `READY` and releases the pending
    /// mount. A readiness signal in any other state is reported by the router
    /// and otherwise ignored.
    pub fn attach_readiness_route(&self, router: &Router) {
        let entry = Rc::clone(&self.entry);
        let readiness = Rc::clone(&self.readiness);
        router.register_handler(APP_READY, move |_version, _payload| {
            let became_ready = entry.borrow_mut().signal_ready();
            if became_ready {
                readiness.release();
                Ok(())
            } else {
                Err(HandlerError::new(format!(
                    "readiness signal while {}; ignored",
                    entry.borrow().lifecycle_state()
                )))
            }
        });
    }

    /// Mounts the version resolved for `major.minor`.
    ///
    /// Mounting the version that is already mounted returns immediately.
    /// Mounting a different version unmounts the current one first.
    ///
    /// # Errors
    ///
    /// - [`HostError::VersionNotFound`] when no available version matches;
    ///   lifecycle state is left untouched.
    /// - [`HostError::ResourceLoad`] when the descriptor, a code resource, or
    ///   the guest's mount function fails.
    /// - [`HostError::MissingCapability`] when the slot's router or
    ///   dispatcher is gone. The mounter stays disabled afterwards.
    /// - [`HostError::ReadinessAbandoned`] when the slot is unmounted or
    ///   remounted while waiting for readiness.
    /// - [`HostError::Superseded`] when a later mount or unmount took over
    ///   while this one was loading. Superseded mounts leave the slot to
    ///   their successor and are not reported.
    pub async fn mount(&self, major: u32, minor: u32) -> Result<Version, HostError> {
        if let Some(error) = self.disabled.borrow().clone() {
            return Err(error);
        }

        let target = {
            let entry = self.entry.borrow();
            version::resolve(&self.guest_id, entry.available_versions(), major, minor)?
        };
        let mounted = self.entry.borrow().mounted_version().cloned();
        if mounted.as_ref() == Some(&target) {
            debug!(
                target: MOUNTER_TARGET,
                guest = %self.guest_id,
                version = %target,
                "already mounted"
            );
            return Ok(target);
        }
        if mounted.is_some() {
            self.unmount();
        }
        self.discard_leftovers();

        let attempt = self.next_attempt();
        self.entry.borrow_mut().begin_loading();
        self.services.sink.log(
            MOUNTER_SOURCE,
            &format!("guest '{}': mounting {target}", self.guest_id),
        );

        let outcome = self.load_and_handshake(&target, attempt).await;
        if !self.is_current(attempt) {
            let error = outcome.err().unwrap_or_else(|| self.superseded());
            debug!(
                target: MOUNTER_TARGET,
                guest = %self.guest_id,
                version = %target,
                %error,
                "superseded mount finished"
            );
            return Err(error);
        }

        match outcome {
            Ok(()) => {
                if self.entry.borrow_mut().complete_mount(target.clone()) {
                    self.services.sink.log(
                        MOUNTER_SOURCE,
                        &format!("guest '{}': {target} ready", self.guest_id),
                    );
                }
                Ok(target)
            }
            Err(error) => {
                self.readiness.disarm(attempt);
                self.entry.borrow_mut().fail(error.to_string());
                self.services.sink.error(MOUNTER_SOURCE, &error.to_string());
                if matches!(error, HostError::MissingCapability { .. }) {
                    *self.disabled.borrow_mut() = Some(error.clone());
                }
                Err(error)
            }
        }
    }

    async fn load_and_handshake(&self, target: &Version, attempt: u64) -> Result<(), HostError> {
        let router = self
            .router
            .upgrade()
            .ok_or_else(|| self.missing("router"))?;
        let dispatcher = self
            .dispatcher
            .upgrade()
            .ok_or_else(|| self.missing("dispatcher"))?;

        let descriptor = self
            .services
            .fetcher
            .fetch_module_descriptor(&self.guest_id, &target.to_string())
            .await
            .map_err(|error| HostError::resource_load(&self.guest_id, error))?;
        self.ensure_current(attempt)?;
        let base = descriptor.asset_base_url();
        let parts = entrypoints::partition(
            &self.guest_id,
            descriptor.entrypoints(),
            self.services.sink.as_ref(),
        );
        let stylesheets = parts
            .styles
            .iter()
            .map(|style| entrypoints::resolve_url(base, style))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| HostError::resource_load(&self.guest_id, error))?;
        self.entry
            .borrow_mut()
            .set_assets(stylesheets, base.to_owned());

        let key = InterfaceKey::new(self.guest_id.as_str(), target);
        if self.services.interfaces.contains(&key) {
            debug!(
                target: MOUNTER_TARGET,
                guest = %self.guest_id,
                %key,
                "interface resident; skipping code load"
            );
        } else {
            let tag = format!("{}-{target}", self.guest_id);
            for script in &parts.scripts {
                let url = entrypoints::resolve_url(base, script)
                    .map_err(|error| HostError::resource_load(&self.guest_id, error))?;
                let handle = self
                    .services
                    .loader
                    .load_code_resource(&url, &tag)
                    .await
                    .map_err(|error| HostError::resource_load(&self.guest_id, error))?;
                if !self.is_current(attempt) {
                    self.services.loader.remove_code_resource(&handle);
                    return Err(self.superseded());
                }
                self.entry.borrow_mut().track_code_handle(handle);
            }
        }

        let interface = self.services.interfaces.lookup(&key).ok_or_else(|| {
            HostError::resource_load(
                &self.guest_id,
                format!("loaded code did not publish '{key}'"),
            )
        })?;

        let ready = self.readiness.arm(attempt);
        let handle = interface
            .mount(router.inbound_entry_point())
            .map_err(|error| HostError::resource_load(&self.guest_id, error))?;
        dispatcher.register_guest_handle(handle);

        if self
            .services
            .quirks
            .skips_readiness_wait(&self.guest_id, target)
        {
            self.readiness.disarm(attempt);
            self.entry.borrow_mut().signal_ready();
            self.services.sink.log(
                MOUNTER_SOURCE,
                &format!(
                    "guest '{}': readiness wait skipped for {target}",
                    self.guest_id
                ),
            );
            return Ok(());
        }

        debug!(
            target: MOUNTER_TARGET,
            guest = %self.guest_id,
            version = %target,
            "waiting for readiness"
        );
        ready
            .await
            .map_err(|_| HostError::ReadinessAbandoned {
                guest_id: self.guest_id.clone(),
            })
    }

    /// Tears down the mounted version.
    ///
    /// Withdraws the version's interface, removes its code resources, clears
    /// per-version assets, resets the entry to `INIT`, and drops the
    /// dispatcher's call-handle. Does nothing when the slot is idle in
    /// `INIT`. A mount still in flight is superseded and its readiness wait
    /// abandoned.
    pub fn unmount(&self) {
        let (mounted, state) = {
            let entry = self.entry.borrow();
            (entry.mounted_version().cloned(), entry.lifecycle_state())
        };
        if mounted.is_none() && state == LifecycleState::Init {
            debug!(target: MOUNTER_TARGET, guest = %self.guest_id, "nothing mounted");
            return;
        }

        if let Some(version) = &mounted {
            self.services
                .interfaces
                .withdraw(&InterfaceKey::new(self.guest_id.as_str(), version));
        }
        let handles = self.entry.borrow_mut().take_code_handles();
        for handle in &handles {
            self.services.loader.remove_code_resource(handle);
        }
        self.next_attempt();
        self.entry.borrow_mut().reset();
        self.readiness.abandon();
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.clear();
        }

        let label = mounted.map_or_else(|| state.to_string(), |version| version.to_string());
        self.services.sink.log(
            MOUNTER_SOURCE,
            &format!("guest '{}': unmounted {label}", self.guest_id),
        );
    }

    /// Releases code resources left behind by a failed or superseded mount.
    ///
    /// Runs before the next attempt starts, so every tracked handle belongs
    /// to an attempt that can no longer track more.
    fn discard_leftovers(&self) {
        let leftovers = {
            let mut entry = self.entry.borrow_mut();
            entry.clear_assets();
            entry.take_code_handles()
        };
        if leftovers.is_empty() {
            return;
        }
        for handle in &leftovers {
            self.services.loader.remove_code_resource(handle);
        }
        debug!(
            target: MOUNTER_TARGET,
            guest = %self.guest_id,
            released = leftovers.len(),
            "released code from an earlier attempt"
        );
    }

    fn next_attempt(&self) -> u64 {
        let attempt = self.attempt.get().wrapping_add(1);
        self.attempt.set(attempt);
        attempt
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.get() == attempt
    }

    fn ensure_current(&self, attempt: u64) -> Result<(), HostError> {
        if self.is_current(attempt) {
            Ok(())
        } else {
            Err(self.superseded())
        }
    }

    fn superseded(&self) -> HostError {
        HostError::Superseded {
            guest_id: self.guest_id.clone(),
        }
    }

    fn missing(&self, capability: &'static str) -> HostError {
        HostError::MissingCapability {
            guest_id: self.guest_id.clone(),
            capability,
        }
    }
}

impl fmt::Debug for Mounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounter")
            .field("guest_id", &self.guest_id)
            .field("awaiting_readiness", &self.readiness.is_armed())
            .field("disabled", &self.is_disabled())
            .finish_non_exhaustive()
    }
}
