//! Guest registry entry and lifecycle state.
//!
//! One [`GuestEntry`] exists per registered guest identity for as long as
//! its slot lives. Ordinary unmount only resets the mounted version, the
//! lifecycle state, and the per-version resources; identity and the
//! available version set survive.

use std::cell::RefCell;
use std::rc::Rc;

use strum::{Display, EnumString};

use crate::loader::CodeHandle;
use crate::version::Version;

/// Entry shared between a slot's mounter and its inbound handlers.
pub type SharedEntry = Rc<RefCell<GuestEntry>>;

/// Lifecycle of a guest slot.
///
/// `Init` doubles as the unmounted state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Nothing mounted.
    #[default]
    Init,
    /// A mount is in progress.
    Loading,
    /// The mounted guest signalled readiness.
    Ready,
    /// The last mount attempt failed.
    Error,
}

/// Identity and mount state of one guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestEntry {
    id: String,
    available_versions: Vec<Version>,
    mounted_version: Option<Version>,
    lifecycle_state: LifecycleState,
    last_error: Option<String>,
    loaded_code_handles: Vec<CodeHandle>,
    stylesheets: Vec<String>,
    asset_base_url: Option<String>,
}

impl GuestEntry {
    /// Creates an entry in the [`LifecycleState::Init`] state.
    ///
    /// Duplicate versions are collapsed; the first occurrence is kept.
    #[must_use]
    pub fn new(id: impl Into<String>, available_versions: impl IntoIterator<Item = Version>) -> Self {
        let mut versions: Vec<Version> = Vec::new();
        for version in available_versions {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
        Self {
            id: id.into(),
            available_versions: versions,
            mounted_version: None,
            lifecycle_state: LifecycleState::Init,
            last_error: None,
            loaded_code_handles: Vec::new(),
            stylesheets: Vec::new(),
            asset_base_url: None,
        }
    }

    /// Wraps the entry for sharing within a slot.
    #[must_use]
    pub fn into_shared(self) -> SharedEntry {
        Rc::new(RefCell::new(self))
    }

    /// Returns the guest identity.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the versions this guest can be mounted at.
    #[must_use]
    pub const fn available_versions(&self) -> &[Version] {
        self.available_versions.as_slice()
    }

    /// Returns the mounted version, if any.
    #[must_use]
    pub const fn mounted_version(&self) -> Option<&Version> {
        self.mounted_version.as_ref()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    /// Returns the failure message of the last mount attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the code resources loaded for the current mount.
    #[must_use]
    pub const fn loaded_code_handles(&self) -> &[CodeHandle] {
        self.loaded_code_handles.as_slice()
    }

    /// Returns the resolved stylesheet URLs of the current mount.
    #[must_use]
    pub const fn stylesheets(&self) -> &[String] {
        self.stylesheets.as_slice()
    }

    /// Returns the asset base URL of the current mount.
    #[must_use]
    pub fn asset_base_url(&self) -> Option<&str> {
        self.asset_base_url.as_deref()
    }

    /// Returns `true` when a version is mounted.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted_version.is_some()
    }

    pub(crate) fn begin_loading(&mut self) {
        self.lifecycle_state = LifecycleState::Loading;
        self.last_error = None;
    }

    /// Applies an inbound readiness signal. Only a loading guest can become
    /// ready; returns `false` otherwise.
    pub(crate) fn signal_ready(&mut self) -> bool {
        if self.lifecycle_state != LifecycleState::Loading {
            return false;
        }
        self.lifecycle_state = LifecycleState::Ready;
        true
    }

    /// Records a finished mount. Ignored unless the entry is still mid-mount.
    pub(crate) fn complete_mount(&mut self, version: Version) -> bool {
        if !matches!(
            self.lifecycle_state,
            LifecycleState::Loading | LifecycleState::Ready
        ) {
            return false;
        }
        self.lifecycle_state = LifecycleState::Ready;
        self.mounted_version = Some(version);
        true
    }

    /// Records a failed mount. Ignored unless the entry is still mid-mount.
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if !matches!(
            self.lifecycle_state,
            LifecycleState::Loading | LifecycleState::Ready
        ) || self.mounted_version.is_some()
        {
            return false;
        }
        self.lifecycle_state = LifecycleState::Error;
        self.last_error = Some(message.into());
        true
    }

    pub(crate) fn track_code_handle(&mut self, handle: CodeHandle) {
        self.loaded_code_handles.push(handle);
    }

    pub(crate) fn take_code_handles(&mut self) -> Vec<CodeHandle> {
        std::mem::take(&mut self.loaded_code_handles)
    }

    pub(crate) fn set_assets(&mut self, stylesheets: Vec<String>, asset_base_url: String) {
        self.stylesheets = stylesheets;
        self.asset_base_url = Some(asset_base_url);
    }

    pub(crate) fn clear_assets(&mut self) {
        self.stylesheets.clear();
        self.asset_base_url = None;
    }

    /// Returns the entry to the unmounted state, keeping identity and
    /// available versions.
    pub(crate) fn reset(&mut self) {
        self.mounted_version = None;
        self.lifecycle_state = LifecycleState::Init;
        self.loaded_code_handles.clear();
        self.clear_assets();
    }
}
