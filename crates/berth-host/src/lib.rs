//! Host side of the guest module protocol.
//!
//! The `berth-host` crate loads versioned, independently built guest modules
//! into a long-lived host, negotiates a communication contract with each
//! one, and exchanges typed, versioned [`Request`]s with it.
//!
//! # Architecture
//!
//! Every registered guest identity owns a [`GuestSlot`]:
//!
//! - a [`GuestEntry`] with its identity, available versions, and lifecycle
//!   state;
//! - a [`Router`] receiving inbound requests through the
//!   [`InboundEntryPoint`](router::InboundEntryPoint) handed to the guest;
//! - a [`Dispatcher`] sending outbound requests through the call-handle the
//!   guest returns, and negotiating protocol and payload versions;
//! - a [`Mounter`] resolving versions, loading code through the injected
//!   collaborators, and waiting for the guest's readiness signal.
//!
//! [`GuestHost`] owns the slots of one host session. Collaborators that
//! fetch descriptors, load code, and report tolerated conditions are
//! injected through [`HostServices`]. All state is single-threaded; waits
//! suspend the calling future and never block.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use berth_host::{GuestHost, HostServices, InterfaceRegistry, Version};
//! # use berth_host::loader::{CodeHandle, CodeLoader, DescriptorFetcher, ModuleDescriptor};
//! # use berth_host::error::LoadError;
//! # struct Cdn;
//! # #[async_trait::async_trait(?Send)]
//! # impl DescriptorFetcher for Cdn {
//! #     async fn fetch_module_descriptor(&self, _: &str, _: &str) -> Result<ModuleDescriptor, LoadError> {
//! #         Err(LoadError::Parse { message: String::from("offline") })
//! #     }
//! # }
//! # #[async_trait::async_trait(?Send)]
//! # impl CodeLoader for Cdn {
//! #     async fn load_code_resource(&self, url: &str, _: &str) -> Result<CodeHandle, LoadError> {
//! #         Ok(CodeHandle::new("1", url))
//! #     }
//! #     fn remove_code_resource(&self, _: &CodeHandle) {}
//! # }
//! use futures::executor::LocalPool;
//!
//! let mut pool = LocalPool::new();
//! let cdn = Rc::new(Cdn);
//! let services = HostServices::new(
//!     cdn.clone(),
//!     cdn,
//!     Rc::new(InterfaceRegistry::new()),
//!     Rc::new(pool.spawner()),
//! );
//! let host = GuestHost::new(services);
//! host.register_guest("quiz", [Version::parse("1.0.0").expect("version")])
//!     .expect("register");
//! let mounted = pool.run_until(host.mount("quiz", 1, 0));
//! ```

pub mod dispatcher;
pub mod entry;
pub mod entrypoints;
pub mod error;
pub mod host;
pub mod loader;
pub mod mounter;
pub mod protocol;
pub mod quirks;
pub mod router;
pub mod sink;
pub mod slot;
pub mod version;

#[cfg(test)]
mod tests;

pub use self::dispatcher::{Dispatcher, GuestHandle};
pub use self::entry::{GuestEntry, LifecycleState};
pub use self::error::{GuestCallError, HandlerError, HostError, LoadError};
pub use self::host::{GuestHost, HostServices};
pub use self::loader::{GuestInterface, InterfaceKey, InterfaceRegistry};
pub use self::mounter::Mounter;
pub use self::protocol::Request;
pub use self::quirks::{QuirkBehaviour, QuirkRule, QuirksTable};
pub use self::router::Router;
pub use self::sink::{ObservabilitySink, Severity, TracingSink};
pub use self::slot::GuestSlot;
pub use self::version::{Stage, Version, VersionParseError};
