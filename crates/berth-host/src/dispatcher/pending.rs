//! Table of outbound requests awaiting a guest answer.
//!
//! Each entry pairs a [`CallbackId`] with the sending half of a oneshot
//! channel. The receiving half is handed to the caller as a
//! [`CallbackReply`] future, and the router resolves the entry when the
//! matching `CALLBACK_RESULT` request arrives.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::CallbackId;

/// The callback was cancelled before the guest answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("callback {id} was cancelled before the guest answered")]
pub struct CallbackCancelled {
    /// Callback that was cancelled.
    pub id: CallbackId,
}

/// Future resolving to the guest's answer for one callback.
#[derive(Debug)]
pub struct CallbackReply {
    id: CallbackId,
    receiver: oneshot::Receiver<Value>,
}

impl CallbackReply {
    /// Returns the callback id carried by the outbound request.
    #[must_use]
    pub const fn id(&self) -> CallbackId {
        self.id
    }
}

impl Future for CallbackReply {
    type Output = Result<Value, CallbackCancelled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| CallbackCancelled { id }))
    }
}

/// Outstanding callbacks for one guest slot.
#[derive(Debug, Default)]
pub struct PendingCallbacks {
    next_id: Cell<u64>,
    waiting: RefCell<HashMap<CallbackId, oneshot::Sender<Value>>>,
}

impl PendingCallbacks {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a callback id and the future that resolves with its answer.
    #[must_use]
    pub fn open(&self) -> (CallbackId, CallbackReply) {
        let raw = self.next_id.get().wrapping_add(1);
        self.next_id.set(raw);
        let id = CallbackId::new(raw);
        let (sender, receiver) = oneshot::channel();
        self.waiting.borrow_mut().insert(id, sender);
        (id, CallbackReply { id, receiver })
    }

    /// Delivers `value` to the waiter for `id`.
    ///
    /// Returns `false` when no waiter is registered under `id` or the waiter
    /// has already been dropped.
    pub fn resolve(&self, id: CallbackId, value: Value) -> bool {
        let sender = self.waiting.borrow_mut().remove(&id);
        sender.is_some_and(|waiter| waiter.send(value).is_ok())
    }

    /// Drops the waiter for `id`; its future resolves to
    /// [`CallbackCancelled`].
    pub fn cancel(&self, id: CallbackId) {
        self.waiting.borrow_mut().remove(&id);
    }

    /// Drops every waiter.
    pub fn cancel_all(&self) {
        self.waiting.borrow_mut().clear();
    }

    /// Returns the number of outstanding callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.borrow().len()
    }

    /// Returns `true` when no callbacks are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.borrow().is_empty()
    }
}
