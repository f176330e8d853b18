//! One-shot latch released by the guest's readiness signal.

use std::cell::RefCell;

use futures::channel::oneshot;

/// Latch a mount waits on until the guest sends `APP_READY`.
///
/// Each waiter is owned by one mount attempt. Arming replaces any earlier
/// waiter, which then observes cancellation.
#[derive(Debug, Default)]
pub(crate) struct ReadinessLatch {
    waiter: RefCell<Option<(u64, oneshot::Sender<()>)>>,
}

impl ReadinessLatch {
    pub(crate) fn arm(&self, attempt: u64) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        *self.waiter.borrow_mut() = Some((attempt, sender));
        receiver
    }

    /// Wakes the armed waiter, returning `false` when none is armed.
    pub(crate) fn release(&self) -> bool {
        let armed = self.waiter.borrow_mut().take();
        armed.is_some_and(|(_, sender)| sender.send(()).is_ok())
    }

    /// Drops the waiter if `attempt` still owns it.
    pub(crate) fn disarm(&self, attempt: u64) {
        let mut waiter = self.waiter.borrow_mut();
        if waiter.as_ref().is_some_and(|(owner, _)| *owner == attempt) {
            *waiter = None;
        }
    }

    /// Drops whichever waiter is armed so its mount fails instead of hanging.
    pub(crate) fn abandon(&self) {
        *self.waiter.borrow_mut() = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.waiter.borrow().is_some()
    }
}
