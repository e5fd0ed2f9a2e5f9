//! # Cancellation Handles
//!
//! A waiting thread cannot be interrupted from outside, so cancellation is an
//! explicit flag bound to one barrier. Cancelling wakes the barrier's waiters;
//! the one holding the cancelled handle breaks the barrier and returns
//! [`BarrierError::Cancelled`](crate::BarrierError::Cancelled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::barrier::Core;

/// A cancellation flag bound to a single barrier.
///
/// Clones share the flag. Cancellation is sticky: once cancelled, every
/// cancellable wait using this handle breaks the barrier.
#[derive(Clone)]
pub struct CancelHandle {
    /// Shared barrier state, used to wake waiters.
    pub(crate) core: Arc<Core>,
    /// Whether cancellation was requested.
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation and wakes every waiter of the bound barrier.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Taking the state lock orders this wakeup after any waiter that
        // checked the flag and is about to park.
        let _state = self.core.state.lock();
        self.core.released.notify_all();
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
