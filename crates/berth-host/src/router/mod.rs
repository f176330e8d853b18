//! Host request router for inbound guest requests.
//!
//! The [`Router`] owns the routing table for one guest slot: at most one
//! [`RequestHandler`] per request type. Guests reach it through the
//! [`InboundEntryPoint`] handed to their mount function. Routing never fails
//! from the guest's point of view: unknown types, handler errors, and handler
//! panics are reported through the sink and the request is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::error::HandlerError;
use crate::protocol::Request;
use crate::sink::{ObservabilitySink, ROUTER_SOURCE};

/// Tracing target for routing operations.
const ROUTER_TARGET: &str = "berth_host::router";

/// Handles one inbound request type.
///
/// Closures taking `(version, payload)` implement this trait, which keeps
/// registration sites terse:
///
/// ```
/// use std::rc::Rc;
/// use berth_host::router::Router;
/// use berth_host::sink::TracingSink;
///
/// let router = Router::new("quiz", Rc::new(TracingSink));
/// router.register_handler("SCORE_CHANGED", |_version, _payload| Ok(()));
/// assert!(router.has_handler("SCORE_CHANGED"));
/// ```
pub trait RequestHandler {
    /// Processes a request of the registered type.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the request cannot be processed. The
    /// router reports the failure; it is never propagated to the guest.
    fn handle(&self, version: u32, payload: Option<&Value>) -> Result<(), HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(u32, Option<&Value>) -> Result<(), HandlerError>,
{
    fn handle(&self, version: u32, payload: Option<&Value>) -> Result<(), HandlerError> {
        self(version, payload)
    }
}

/// Routing table for inbound requests from one guest.
pub struct Router {
    guest_id: String,
    handlers: RefCell<HashMap<String, Rc<dyn RequestHandler>>>,
    sink: Rc<dyn ObservabilitySink>,
}

impl Router {
    /// Creates an empty router for `guest_id`.
    #[must_use]
    pub fn new(guest_id: impl Into<String>, sink: Rc<dyn ObservabilitySink>) -> Self {
        Self {
            guest_id: guest_id.into(),
            handlers: RefCell::new(HashMap::new()),
            sink,
        }
    }

    /// Returns the guest this router serves.
    #[must_use]
    pub const fn guest_id(&self) -> &str {
        self.guest_id.as_str()
    }

    /// Installs the closure `handler` for `kind`.
    ///
    /// An existing handler for the same type is replaced and the overwrite is
    /// reported. Returns `true` when a handler was replaced.
    pub fn register_handler<F>(&self, kind: impl Into<String>, handler: F) -> bool
    where
        F: Fn(u32, Option<&Value>) -> Result<(), HandlerError> + 'static,
    {
        self.install(kind.into(), Rc::new(handler))
    }

    /// Installs a shared [`RequestHandler`] for `kind`.
    ///
    /// Behaves like [`Router::register_handler`] for handler types that are
    /// not closures.
    pub fn install(&self, kind: impl Into<String>, handler: Rc<dyn RequestHandler>) -> bool {
        let request_type = kind.into();
        let previous = self
            .handlers
            .borrow_mut()
            .insert(request_type.clone(), handler);
        if previous.is_some() {
            self.sink.warn(
                ROUTER_SOURCE,
                &format!(
                    "guest '{}': handler for '{request_type}' replaced an existing handler",
                    self.guest_id
                ),
            );
        }
        previous.is_some()
    }

    /// Removes the handler for `kind`, returning `true` if one was installed.
    pub fn unregister_handler(&self, kind: &str) -> bool {
        self.handlers.borrow_mut().remove(kind).is_some()
    }

    /// Returns `true` when a handler is installed for `kind`.
    #[must_use]
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.borrow().contains_key(kind)
    }

    /// Dispatches `request` to its handler.
    ///
    /// Unknown types are reported as unsupported. Handler errors and panics
    /// are caught and reported; neither escapes this call.
    pub fn route(&self, request: &Request) {
        let installed = self.handlers.borrow().get(request.kind()).cloned();
        let Some(handler) = installed else {
            self.sink.warn(
                ROUTER_SOURCE,
                &format!(
                    "guest '{}': unsupported request type '{}'",
                    self.guest_id,
                    request.kind()
                ),
            );
            return;
        };

        debug!(
            target: ROUTER_TARGET,
            guest = %self.guest_id,
            request_type = request.kind(),
            version = request.version(),
            "routing inbound request"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(request.version(), request.payload())
        }));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error.message,
            Err(panic_payload) => panic_message(panic_payload.as_ref()),
        };
        self.sink.warn(
            ROUTER_SOURCE,
            &format!(
                "guest '{}': handler for '{}' failed: {failure}",
                self.guest_id,
                request.kind()
            ),
        );
    }

    /// Returns the entry point guests use to send inbound requests.
    #[must_use]
    pub fn inbound_entry_point(self: &Rc<Self>) -> InboundEntryPoint {
        InboundEntryPoint {
            router: Rc::downgrade(self),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.handlers.borrow().keys().cloned().collect();
        types.sort();
        f.debug_struct("Router")
            .field("guest_id", &self.guest_id)
            .field("handlers", &types)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("handler panicked"))
}

/// Handle a guest uses to deliver requests to the host.
///
/// The entry point holds the router weakly, so a guest that outlives its
/// slot cannot keep the routing table alive; requests sent after teardown
/// are dropped.
#[derive(Debug, Clone)]
pub struct InboundEntryPoint {
    router: Weak<Router>,
}

impl InboundEntryPoint {
    /// Delivers `request` to the router.
    pub fn send(&self, request: &Request) {
        match self.router.upgrade() {
            Some(router) => router.route(request),
            None => debug!(
                target: ROUTER_TARGET,
                request_type = request.kind(),
                "dropping request for a torn down slot"
            ),
        }
    }
}
