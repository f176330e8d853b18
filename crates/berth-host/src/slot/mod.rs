//! Per-guest bundle of entry, router, dispatcher, and mounter.

use std::cell::Ref;
use std::rc::Rc;

use crate::dispatcher::Dispatcher;
use crate::entry::{GuestEntry, SharedEntry};
use crate::error::HostError;
use crate::host::HostServices;
use crate::mounter::Mounter;
use crate::router::Router;
use crate::version::Version;

/// Everything the host keeps for one guest identity.
///
/// Creating a slot wires the router's built-in `CALLBACK_RESULT` and
/// `APP_READY` handlers to the dispatcher and mounter.
#[derive(Debug)]
pub struct GuestSlot {
    entry: SharedEntry,
    router: Rc<Router>,
    dispatcher: Rc<Dispatcher>,
    mounter: Mounter,
}

impl GuestSlot {
    /// Creates a slot for `guest_id`.
    #[must_use]
    pub fn new(
        guest_id: &str,
        available_versions: impl IntoIterator<Item = Version>,
        services: &HostServices,
    ) -> Self {
        let entry = GuestEntry::new(guest_id, available_versions).into_shared();
        let router = Rc::new(Router::new(guest_id, Rc::clone(&services.sink)));
        let dispatcher = Rc::new(Dispatcher::new(
            guest_id,
            Rc::clone(&services.sink),
            Rc::clone(&services.spawner),
        ));
        dispatcher.attach_callback_route(&router);
        let mounter = Mounter::new(Rc::clone(&entry), &router, &dispatcher, services.clone());
        mounter.attach_readiness_route(&router);
        Self {
            entry,
            router,
            dispatcher,
            mounter,
        }
    }

    /// Borrows the registry entry.
    ///
    /// # Panics
    ///
    /// Panics if called while the entry is being mutated, which only happens
    /// from inside the slot's own handlers.
    #[must_use]
    pub fn entry(&self) -> Ref<'_, GuestEntry> {
        self.entry.borrow()
    }

    /// Returns the inbound request router.
    #[must_use]
    pub const fn router(&self) -> &Rc<Router> {
        &self.router
    }

    /// Returns the outbound call dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the lifecycle manager.
    #[must_use]
    pub const fn mounter(&self) -> &Mounter {
        &self.mounter
    }

    /// Mounts the version resolved for `major.minor`.
    ///
    /// # Errors
    ///
    /// See [`Mounter::mount`].
    pub async fn mount(&self, major: u32, minor: u32) -> Result<Version, HostError> {
        self.mounter.mount(major, minor).await
    }

    /// Unmounts the current version.
    pub fn unmount(&self) {
        self.mounter.unmount();
    }
}
