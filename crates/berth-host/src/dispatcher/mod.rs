//! Host call dispatcher for outbound guest requests.
//!
//! The [`Dispatcher`] holds the call-handle returned by the mounted guest and
//! sends typed, versioned requests through it. Registering a handle starts
//! capability negotiation: the guest is asked for its protocol version and,
//! once it answers, for the payload version it supports per request type.
//! Legacy guests reject the first question synchronously; that is expected
//! and leaves the negotiated protocol version at `0`.
//!
//! Negotiation answers arrive as inbound `CALLBACK_RESULT` requests, so the
//! follow-up steps run as a task on the injected [`LocalSpawn`] executor.
//! Each registration bumps a generation counter and answers that belong to an
//! older generation are discarded.

mod pending;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::task::{LocalSpawn, LocalSpawnExt};
use serde_json::Value;
use tracing::debug;

use crate::error::{GuestCallError, HandlerError};
use crate::protocol::{
    self, CALLBACK_RESULT, CALLBACK_VALUE_FIELD, GET_APP_HANDLER_VERSION,
    GET_APP_HANDLER_VERSION_V, GET_APP_PAYLOAD_VERSION, GET_APP_PAYLOAD_VERSION_V, Request,
};
use crate::router::Router;
use crate::sink::{DISPATCHER_SOURCE, ObservabilitySink};

pub use self::pending::{CallbackCancelled, CallbackReply, PendingCallbacks};

/// Tracing target for dispatch operations.
const DISPATCHER_TARGET: &str = "berth_host::dispatcher";

/// Outbound call-handle returned by a guest's mount function.
///
/// Closures taking a request implement this trait.
pub trait GuestHandle {
    /// Delivers `request` to the guest.
    ///
    /// # Errors
    ///
    /// Returns a [`GuestCallError`] when the guest rejects the request
    /// synchronously, for example because it has no handler for its type.
    fn call(&self, request: &Request) -> Result<(), GuestCallError>;
}

impl<F> GuestHandle for F
where
    F: Fn(&Request) -> Result<(), GuestCallError>,
{
    fn call(&self, request: &Request) -> Result<(), GuestCallError> {
        self(request)
    }
}

#[derive(Default)]
struct Session {
    handle: Option<Rc<dyn GuestHandle>>,
    generation: u64,
    protocol_version: u32,
    payload_versions: HashMap<String, u32>,
}

/// Sends requests to the mounted guest and tracks negotiated capabilities.
pub struct Dispatcher {
    guest_id: String,
    session: Rc<RefCell<Session>>,
    callbacks: Rc<PendingCallbacks>,
    sink: Rc<dyn ObservabilitySink>,
    spawner: Rc<dyn LocalSpawn>,
}

impl Dispatcher {
    /// Creates a dispatcher with no registered handle.
    #[must_use]
    pub fn new(
        guest_id: impl Into<String>,
        sink: Rc<dyn ObservabilitySink>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> Self {
        Self {
            guest_id: guest_id.into(),
            session: Rc::default(),
            callbacks: Rc::new(PendingCallbacks::new()),
            sink,
            spawner,
        }
    }

    /// Returns the guest this dispatcher serves.
    #[must_use]
    pub const fn guest_id(&self) -> &str {
        self.guest_id.as_str()
    }

    /// Routes inbound `CALLBACK_RESULT` requests on `router` to this
    /// dispatcher's pending callbacks.
    pub fn attach_callback_route(&self, router: &Router) {
        let callbacks = Rc::clone(&self.callbacks);
        router.register_handler(CALLBACK_RESULT, move |_version, payload| {
            let id = protocol::callback_id_of(payload)
                .ok_or_else(|| HandlerError::new("callback result without a callback id"))?;
            let value = payload
                .and_then(|fields| fields.get(CALLBACK_VALUE_FIELD))
                .cloned()
                .unwrap_or(Value::Null);
            if callbacks.resolve(id, value) {
                Ok(())
            } else {
                Err(HandlerError::new(format!("no pending callback {id}")))
            }
        });
    }

    /// Stores `handle` as the outbound target and starts capability
    /// negotiation.
    ///
    /// Negotiated state from any previous handle is discarded first.
    pub fn register_guest_handle(&self, handle: Rc<dyn GuestHandle>) {
        let generation = {
            let mut session = self.session.borrow_mut();
            session.handle = Some(Rc::clone(&handle));
            session.generation = session.generation.wrapping_add(1);
            session.protocol_version = 0;
            session.payload_versions.clear();
            session.generation
        };

        let Some(reply) = self.ask(
            handle.as_ref(),
            GET_APP_HANDLER_VERSION,
            GET_APP_HANDLER_VERSION_V,
        ) else {
            return;
        };

        let negotiation = Negotiation {
            guest_id: self.guest_id.clone(),
            generation,
            session: Rc::clone(&self.session),
            callbacks: Rc::clone(&self.callbacks),
            sink: Rc::clone(&self.sink),
        };
        let reply_id = reply.id();
        if let Err(error) = self.spawner.spawn_local(negotiation.run(handle, reply)) {
            self.callbacks.cancel(reply_id);
            self.sink.warn(
                DISPATCHER_SOURCE,
                &format!(
                    "guest '{}': capability negotiation could not be scheduled: {error}",
                    self.guest_id
                ),
            );
        }
    }

    /// Sends a negotiation question, returning `None` when the guest declines.
    fn ask(&self, handle: &dyn GuestHandle, kind: &str, version: u32) -> Option<CallbackReply> {
        let (id, reply) = self.callbacks.open();
        match handle.call(&Request::with_callback(kind, version, None, id)) {
            Ok(()) => Some(reply),
            Err(error) => {
                self.callbacks.cancel(id);
                debug!(
                    target: DISPATCHER_TARGET,
                    guest = %self.guest_id,
                    %error,
                    "guest declined capability negotiation; treating as legacy"
                );
                None
            }
        }
    }

    /// Sends `request` to the registered handle.
    ///
    /// Without a registered handle the request is reported and dropped. A
    /// synchronous rejection by the guest is reported as well.
    pub fn dispatch(&self, request: &Request) {
        let registered = self.session.borrow().handle.clone();
        let Some(handle) = registered else {
            self.sink.warn(
                DISPATCHER_SOURCE,
                &format!(
                    "guest '{}': no handler registered; dropping '{}'",
                    self.guest_id,
                    request.kind()
                ),
            );
            return;
        };
        debug!(
            target: DISPATCHER_TARGET,
            guest = %self.guest_id,
            request_type = request.kind(),
            version = request.version(),
            "dispatching outbound request"
        );
        if let Err(error) = handle.call(request) {
            self.sink.warn(
                DISPATCHER_SOURCE,
                &format!("guest '{}': {error}", self.guest_id),
            );
        }
    }

    /// Builds a request from its parts and dispatches it.
    pub fn form_and_dispatch(&self, kind: &str, version: u32, payload: Option<Value>) {
        self.dispatch(&Request::new(kind, version, payload));
    }

    /// Dispatches a request that expects an answer and returns the future
    /// resolving with it.
    ///
    /// Returns `None` when the request could not be delivered; the reason is
    /// reported as for [`Dispatcher::dispatch`].
    #[must_use]
    pub fn request_with_callback(
        &self,
        kind: &str,
        version: u32,
        payload: Option<Value>,
    ) -> Option<CallbackReply> {
        let registered = self.session.borrow().handle.clone();
        let Some(handle) = registered else {
            self.sink.warn(
                DISPATCHER_SOURCE,
                &format!(
                    "guest '{}': no handler registered; dropping '{kind}'",
                    self.guest_id
                ),
            );
            return None;
        };
        let (id, reply) = self.callbacks.open();
        match handle.call(&Request::with_callback(kind, version, payload, id)) {
            Ok(()) => Some(reply),
            Err(error) => {
                self.callbacks.cancel(id);
                self.sink.warn(
                    DISPATCHER_SOURCE,
                    &format!("guest '{}': {error}", self.guest_id),
                );
                None
            }
        }
    }

    /// Returns the negotiated protocol version; `0` means legacy or not yet
    /// negotiated.
    #[must_use]
    pub fn negotiated_protocol_version(&self) -> u32 {
        self.session.borrow().protocol_version
    }

    /// Returns the payload version the guest declared for `kind`.
    #[must_use]
    pub fn negotiated_payload_version(&self, kind: &str) -> Option<u32> {
        self.session.borrow().payload_versions.get(kind).copied()
    }

    /// Picks the payload shape to send for `kind`.
    ///
    /// The guest's declared version wins when it is one of `known`;
    /// otherwise the newest known shape is used and the substitution is
    /// reported. Returns `None` only when `known` is empty.
    #[must_use]
    pub fn choose_payload_version(&self, kind: &str, known: &[u32]) -> Option<u32> {
        let declared = self.negotiated_payload_version(kind);
        if let Some(version) = declared.filter(|v| known.contains(v)) {
            return Some(version);
        }
        let newest = known.iter().copied().max()?;
        let declared_text = declared.map_or_else(|| String::from("nothing"), |v| format!("v{v}"));
        self.sink.warn(
            DISPATCHER_SOURCE,
            &format!(
                "guest '{}' declared {declared_text} for '{kind}'; sending v{newest}",
                self.guest_id
            ),
        );
        Some(newest)
    }

    /// Returns `true` while a guest handle is registered.
    #[must_use]
    pub fn has_handle(&self) -> bool {
        self.session.borrow().handle.is_some()
    }

    /// Drops the registered handle, negotiated state, and pending callbacks.
    pub fn clear(&self) {
        {
            let mut session = self.session.borrow_mut();
            session.handle = None;
            session.generation = session.generation.wrapping_add(1);
            session.protocol_version = 0;
            session.payload_versions.clear();
        }
        self.callbacks.cancel_all();
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.borrow();
        f.debug_struct("Dispatcher")
            .field("guest_id", &self.guest_id)
            .field("has_handle", &session.handle.is_some())
            .field("protocol_version", &session.protocol_version)
            .field("payload_versions", &session.payload_versions)
            .field("pending_callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Background continuation of capability negotiation.
struct Negotiation {
    guest_id: String,
    generation: u64,
    session: Rc<RefCell<Session>>,
    callbacks: Rc<PendingCallbacks>,
    sink: Rc<dyn ObservabilitySink>,
}

impl Negotiation {
    fn is_current(&self) -> bool {
        self.session.borrow().generation == self.generation
    }

    async fn run(self, handle: Rc<dyn GuestHandle>, reply: CallbackReply) {
        let Ok(answer) = reply.await else {
            return;
        };
        if !self.is_current() {
            debug!(
                target: DISPATCHER_TARGET,
                guest = %self.guest_id,
                "discarding stale protocol version"
            );
            return;
        }
        let Some(protocol_version) = answer.as_u64().and_then(|v| u32::try_from(v).ok()) else {
            self.sink.warn(
                DISPATCHER_SOURCE,
                &format!(
                    "guest '{}': malformed protocol version answer {answer}",
                    self.guest_id
                ),
            );
            return;
        };
        self.session.borrow_mut().protocol_version = protocol_version;
        debug!(
            target: DISPATCHER_TARGET,
            guest = %self.guest_id,
            protocol_version,
            "negotiated protocol version"
        );

        let (id, payload_reply) = self.callbacks.open();
        let question = Request::with_callback(
            GET_APP_PAYLOAD_VERSION,
            GET_APP_PAYLOAD_VERSION_V,
            None,
            id,
        );
        if let Err(error) = handle.call(&question) {
            self.callbacks.cancel(id);
            debug!(
                target: DISPATCHER_TARGET,
                guest = %self.guest_id,
                %error,
                "guest declined payload version negotiation"
            );
            return;
        }
        let Ok(versions_answer) = payload_reply.await else {
            return;
        };
        if !self.is_current() {
            return;
        }
        match serde_json::from_value::<HashMap<String, u32>>(versions_answer) {
            Ok(versions) => self.session.borrow_mut().payload_versions = versions,
            Err(error) => self.sink.warn(
                DISPATCHER_SOURCE,
                &format!(
                    "guest '{}': malformed payload versions answer: {error}",
                    self.guest_id
                ),
            ),
        }
    }
}
