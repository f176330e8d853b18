//! Collaborators that fetch, load, and expose guest code.
//!
//! The host never talks to the network or an execution environment
//! directly. It consumes three narrow interfaces:
//!
//! - [`DescriptorFetcher`] returns where a guest version's code lives.
//! - [`CodeLoader`] loads one code resource into the host environment and
//!   removes it again on unmount.
//! - [`InterfaceRegistry`] is where loaded code publishes its
//!   [`GuestInterface`], keyed by guest identity and version.
//!
//! The registry is an explicit, injected value rather than ambient global
//! state: the embedding host shares one instance between its loader
//! implementation and every mounter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatcher::GuestHandle;
use crate::error::{GuestCallError, LoadError};
use crate::router::InboundEntryPoint;
use crate::version::Version;

/// Where the code for one guest version lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    entrypoints: Vec<String>,
    asset_base_url: String,
}

impl ModuleDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(entrypoints: Vec<String>, asset_base_url: impl Into<String>) -> Self {
        Self {
            entrypoints,
            asset_base_url: asset_base_url.into(),
        }
    }

    /// Returns the entrypoint list, relative to the asset base URL.
    #[must_use]
    pub fn entrypoints(&self) -> &[String] {
        &self.entrypoints
    }

    /// Returns the asset base URL.
    #[must_use]
    pub const fn asset_base_url(&self) -> &str {
        self.asset_base_url.as_str()
    }
}

/// Source of module descriptors.
#[async_trait(?Send)]
pub trait DescriptorFetcher {
    /// Fetches the descriptor for `guest_id` at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Transport`] or [`LoadError::Parse`] when the
    /// descriptor cannot be retrieved or understood.
    async fn fetch_module_descriptor(
        &self,
        guest_id: &str,
        version: &str,
    ) -> Result<ModuleDescriptor, LoadError>;
}

/// Opaque handle to a code resource created in the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeHandle {
    id: String,
    url: String,
}

impl CodeHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// Returns the loader-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the URL the resource was loaded from.
    #[must_use]
    pub const fn url(&self) -> &str {
        self.url.as_str()
    }
}

/// Loads guest code into the host's execution environment.
#[async_trait(?Send)]
pub trait CodeLoader {
    /// Loads and executes the resource at `url`, tagging it with `tag`.
    ///
    /// Executing a guest's code is expected to publish its
    /// [`GuestInterface`] into the shared [`InterfaceRegistry`].
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when the resource cannot be retrieved or
    /// executed.
    async fn load_code_resource(&self, url: &str, tag: &str) -> Result<CodeHandle, LoadError>;

    /// Removes a previously loaded resource from the environment.
    fn remove_code_resource(&self, handle: &CodeHandle);
}

/// Interface a loaded guest exports to the host.
pub trait GuestInterface {
    /// Mounts the guest, giving it the host's inbound entry point, and
    /// returns the guest's outbound call-handle.
    ///
    /// # Errors
    ///
    /// Returns a [`GuestCallError`] when the guest refuses to mount.
    fn mount(&self, inbound: InboundEntryPoint) -> Result<Rc<dyn GuestHandle>, GuestCallError>;
}

/// Lookup key of a published guest interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceKey {
    guest_id: String,
    version_key: String,
}

impl InterfaceKey {
    /// Builds the key for `guest_id` at `version`.
    #[must_use]
    pub fn new(guest_id: impl Into<String>, version: &Version) -> Self {
        Self {
            guest_id: guest_id.into(),
            version_key: version.to_string(),
        }
    }

    /// Returns the guest identity.
    #[must_use]
    pub const fn guest_id(&self) -> &str {
        self.guest_id.as_str()
    }

    /// Returns the version component of the key.
    #[must_use]
    pub const fn version_key(&self) -> &str {
        self.version_key.as_str()
    }
}

impl fmt::Display for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.guest_id, self.version_key)
    }
}

/// Registry of guest interfaces published by loaded code.
#[derive(Default)]
pub struct InterfaceRegistry {
    exports: RefCell<HashMap<InterfaceKey, Rc<dyn GuestInterface>>>,
}

impl InterfaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `interface` under `key`, replacing any earlier entry.
    ///
    /// The last writer wins; returns `true` when an entry was replaced.
    pub fn publish(&self, key: InterfaceKey, interface: Rc<dyn GuestInterface>) -> bool {
        self.exports.borrow_mut().insert(key, interface).is_some()
    }

    /// Returns the interface published under `key`.
    #[must_use]
    pub fn lookup(&self, key: &InterfaceKey) -> Option<Rc<dyn GuestInterface>> {
        self.exports.borrow().get(key).cloned()
    }

    /// Returns `true` when an interface is published under `key`.
    #[must_use]
    pub fn contains(&self, key: &InterfaceKey) -> bool {
        self.exports.borrow().contains_key(key)
    }

    /// Removes the entry under `key`, returning `true` if one existed.
    pub fn withdraw(&self, key: &InterfaceKey) -> bool {
        self.exports.borrow_mut().remove(key).is_some()
    }

    /// Returns the number of published interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exports.borrow().len()
    }

    /// Returns `true` when nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exports.borrow().is_empty()
    }
}

impl fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .exports
            .borrow()
            .keys()
            .map(ToString::to_string)
            .collect();
        keys.sort();
        f.debug_struct("InterfaceRegistry")
            .field("exports", &keys)
            .finish()
    }
}
