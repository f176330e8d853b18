//! Host session owning every guest slot.
//!
//! [`GuestHost`] is the entry point for embedding applications. It registers
//! guest identities, routes mount and unmount calls to the right slot, and
//! tears slots down. The collaborators every slot shares are bundled in
//! [`HostServices`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::task::LocalSpawn;
use tracing::debug;

use crate::error::HostError;
use crate::loader::{CodeLoader, DescriptorFetcher, InterfaceRegistry};
use crate::quirks::QuirksTable;
use crate::sink::{ObservabilitySink, TracingSink};
use crate::slot::GuestSlot;
use crate::version::Version;

/// Tracing target for host session operations.
const HOST_TARGET: &str = "berth_host::host";

/// Collaborators shared by every guest slot of a host session.
#[derive(Clone)]
pub struct HostServices {
    /// Source of module descriptors.
    pub fetcher: Rc<dyn DescriptorFetcher>,
    /// Loads guest code into the host environment.
    pub loader: Rc<dyn CodeLoader>,
    /// Registry loaded code publishes guest interfaces into.
    pub interfaces: Rc<InterfaceRegistry>,
    /// Behaviour overrides for known-defective guests.
    pub quirks: Rc<QuirksTable>,
    /// Destination for tolerated conditions.
    pub sink: Rc<dyn ObservabilitySink>,
    /// Executor for background capability negotiation.
    pub spawner: Rc<dyn LocalSpawn>,
}

impl HostServices {
    /// Bundles the required collaborators with an empty quirks table and a
    /// [`TracingSink`].
    #[must_use]
    pub fn new(
        fetcher: Rc<dyn DescriptorFetcher>,
        loader: Rc<dyn CodeLoader>,
        interfaces: Rc<InterfaceRegistry>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> Self {
        Self {
            fetcher,
            loader,
            interfaces,
            quirks: Rc::default(),
            sink: Rc::new(TracingSink),
            spawner,
        }
    }

    /// Replaces the quirks table.
    #[must_use]
    pub fn with_quirks(mut self, quirks: QuirksTable) -> Self {
        self.quirks = Rc::new(quirks);
        self
    }

    /// Replaces the observability sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Rc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("interfaces", &self.interfaces)
            .field("quirks", &self.quirks.len())
            .finish_non_exhaustive()
    }
}

/// A host session: one slot per registered guest identity.
pub struct GuestHost {
    services: HostServices,
    slots: RefCell<HashMap<String, Rc<GuestSlot>>>,
}

impl GuestHost {
    /// Creates a host session with no registered guests.
    #[must_use]
    pub fn new(services: HostServices) -> Self {
        Self {
            services,
            slots: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub const fn services(&self) -> &HostServices {
        &self.services
    }

    /// Creates the slot for `guest_id` with its available versions.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AlreadyRegistered`] when the identity already
    /// has a slot.
    pub fn register_guest(
        &self,
        guest_id: &str,
        available_versions: impl IntoIterator<Item = Version>,
    ) -> Result<Rc<GuestSlot>, HostError> {
        let mut slots = self.slots.borrow_mut();
        if slots.contains_key(guest_id) {
            return Err(HostError::AlreadyRegistered {
                guest_id: guest_id.to_owned(),
            });
        }
        let slot = Rc::new(GuestSlot::new(guest_id, available_versions, &self.services));
        slots.insert(guest_id.to_owned(), Rc::clone(&slot));
        debug!(target: HOST_TARGET, guest = guest_id, "registered guest");
        Ok(slot)
    }

    /// Returns the slot for `guest_id`.
    #[must_use]
    pub fn slot(&self, guest_id: &str) -> Option<Rc<GuestSlot>> {
        self.slots.borrow().get(guest_id).cloned()
    }

    /// Returns every registered identity, sorted.
    #[must_use]
    pub fn guest_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mounts `guest_id` at the version resolved for `major.minor`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotRegistered`] for unknown identities and
    /// otherwise whatever [`GuestSlot::mount`] returns.
    pub async fn mount(&self, guest_id: &str, major: u32, minor: u32) -> Result<Version, HostError> {
        let slot = self.require(guest_id)?;
        slot.mount(major, minor).await
    }

    /// Unmounts `guest_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotRegistered`] for unknown identities.
    pub fn unmount(&self, guest_id: &str) -> Result<(), HostError> {
        self.require(guest_id)?.unmount();
        Ok(())
    }

    /// Unmounts `guest_id` and destroys its slot.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotRegistered`] for unknown identities.
    pub fn teardown(&self, guest_id: &str) -> Result<(), HostError> {
        let removed = self.slots.borrow_mut().remove(guest_id);
        let slot = removed.ok_or_else(|| HostError::NotRegistered {
            guest_id: guest_id.to_owned(),
        })?;
        slot.unmount();
        debug!(target: HOST_TARGET, guest = guest_id, "tore down guest slot");
        Ok(())
    }

    fn require(&self, guest_id: &str) -> Result<Rc<GuestSlot>, HostError> {
        self.slot(guest_id).ok_or_else(|| HostError::NotRegistered {
            guest_id: guest_id.to_owned(),
        })
    }
}

impl fmt::Debug for GuestHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestHost")
            .field("guests", &self.guest_ids())
            .field("services", &self.services)
            .finish()
    }
}
