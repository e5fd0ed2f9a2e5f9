//! # Cyclic Barrier
//!
//! A fixed party of threads meets here. The last to arrive runs the trip
//! action, then the whole cohort is released and the barrier resets for the
//! next generation.
//!
//! ## Design
//!
//! ```text
//!   Thread 0 ──wait()──┐
//!   Thread 1 ──wait()──┼──> [Mutex<State> + Condvar] ──(Pth arrival)──> trip action
//!   Thread P ──wait()──┘          │                                        │
//!                                 └────────── notify_all <─────────────────┘
//! ```
//!
//! - All counters live behind one lock; nothing outside this module can
//!   touch the arrival count.
//! - The trip action runs with the state lock held: a released participant
//!   always observes everything the action did.
//! - Breaking is terminal. Cancellation, timeout, an aborted participant or
//!   a failed trip action all wake the cohort with the same cause.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::action::{NoAction, TripAction};
use crate::cancel::CancelHandle;
use crate::error::{BarrierError, BarrierResult, BrokenCause};

/// Mutable barrier bookkeeping, only ever touched under the lock.
#[derive(Debug)]
pub(crate) struct State {
    /// Participants of the current cohort that have arrived.
    arrived: usize,
    /// Identifies the current cohort; advances on every successful trip.
    generation: u64,
    /// Set once, never cleared.
    broken: Option<BrokenCause>,
}

/// Lock and wakeup signal shared with cancel handles.
pub(crate) struct Core {
    pub(crate) state: Mutex<State>,
    pub(crate) released: Condvar,
}

/// How a participant got through the barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrival {
    /// Zero-based arrival order within the cohort. The tripping participant
    /// has ordinal `parties - 1`.
    pub ordinal: usize,
    /// Generation of the cohort this participant belonged to.
    pub generation: u64,
    /// True only for the participant that ran the trip action.
    pub tripped: bool,
}

/// A reusable barrier for a fixed party size with a trip action.
///
/// ## Usage
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use tally_sync::CyclicBarrier;
///
/// let barrier = CyclicBarrier::plain(NonZeroUsize::MIN);
/// let arrival = barrier.wait().unwrap();
/// assert!(arrival.tripped);
/// assert_eq!(barrier.generation(), 1);
/// ```
pub struct CyclicBarrier<A = NoAction> {
    core: Arc<Core>,
    /// Only locked by the tripping participant, while it holds the state lock.
    action: Mutex<A>,
    parties: usize,
}

impl CyclicBarrier<NoAction> {
    /// Creates a barrier without a trip action.
    #[must_use]
    pub fn plain(parties: NonZeroUsize) -> Self {
        Self::new(parties, NoAction)
    }
}

impl<A: TripAction> CyclicBarrier<A> {
    /// Creates a barrier for `parties` participants that runs `action` each
    /// time the last of them arrives.
    #[must_use]
    pub fn new(parties: NonZeroUsize, action: A) -> Self {
        Self {
            core: Arc::new(Core {
                state: Mutex::new(State {
                    arrived: 0,
                    generation: 0,
                    broken: None,
                }),
                released: Condvar::new(),
            }),
            action: Mutex::new(action),
            parties: parties.get(),
        }
    }

    /// Number of participants required to trip the barrier.
    #[inline]
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of participants currently suspended in the barrier.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.core.state.lock().arrived
    }

    /// Generation of the cohort currently gathering.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.core.state.lock().generation
    }

    /// Returns true once the barrier is broken.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.core.state.lock().broken.is_some()
    }

    /// Returns the reason the barrier broke, if it did.
    #[must_use]
    pub fn broken_cause(&self) -> Option<BrokenCause> {
        self.core.state.lock().broken.clone()
    }

    /// Creates a cancellation handle bound to this barrier.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.core))
    }

    /// Waits until every party has arrived.
    ///
    /// # Errors
    ///
    /// Fails with [`BarrierError::Broken`] if the barrier is or becomes
    /// broken, or [`BarrierError::TripFailed`] if this caller ran the trip
    /// action and it failed.
    pub fn wait(&self) -> BarrierResult<Arrival> {
        self.wait_inner(None, None)
    }

    /// Waits at most `timeout`. An expired wait breaks the barrier.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`BarrierError::TimedOut`] for the
    /// caller whose wait expired.
    pub fn wait_timeout(&self, timeout: Duration) -> BarrierResult<Arrival> {
        self.wait_inner(Some(Instant::now() + timeout), None)
    }

    /// Waits until every party has arrived or `cancel` is cancelled.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`BarrierError::Cancelled`] for the
    /// cancelled caller and [`BarrierError::ForeignHandle`] if the handle
    /// was created by another barrier.
    pub fn wait_cancellable(&self, cancel: &CancelHandle) -> BarrierResult<Arrival> {
        if !Arc::ptr_eq(&cancel.core, &self.core) {
            return Err(BarrierError::ForeignHandle);
        }
        self.wait_inner(None, Some(cancel))
    }

    /// Cancellable wait that also gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Any of the errors of [`wait_timeout`](Self::wait_timeout) and
    /// [`wait_cancellable`](Self::wait_cancellable).
    pub fn wait_cancellable_timeout(
        &self,
        cancel: &CancelHandle,
        timeout: Duration,
    ) -> BarrierResult<Arrival> {
        if !Arc::ptr_eq(&cancel.core, &self.core) {
            return Err(BarrierError::ForeignHandle);
        }
        self.wait_inner(Some(Instant::now() + timeout), Some(cancel))
    }

    /// Breaks the barrier on behalf of a participant that cannot arrive.
    ///
    /// Has no effect on a barrier that is already broken.
    pub fn abort(&self, reason: impl Into<String>) {
        let mut state = self.core.state.lock();
        if state.broken.is_none() {
            self.break_locked(&mut state, BrokenCause::ParticipantFailed(reason.into()));
        }
    }

    fn wait_inner(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancelHandle>,
    ) -> BarrierResult<Arrival> {
        let mut state = self.core.state.lock();

        if let Some(cause) = &state.broken {
            return Err(BarrierError::Broken(cause.clone()));
        }
        if cancel.is_some_and(CancelHandle::is_cancelled) {
            self.break_locked(&mut state, BrokenCause::Cancelled);
            return Err(BarrierError::Cancelled);
        }

        let generation = state.generation;
        let ordinal = state.arrived;
        state.arrived += 1;

        if state.arrived == self.parties {
            return self.trip(&mut state, ordinal);
        }

        loop {
            match deadline {
                Some(deadline) => {
                    // Expiry is re-checked below, after release and breakage.
                    let _ = self.core.released.wait_until(&mut state, deadline);
                }
                None => self.core.released.wait(&mut state),
            }

            if state.generation != generation {
                return Ok(Arrival {
                    ordinal,
                    generation,
                    tripped: false,
                });
            }
            if let Some(cause) = &state.broken {
                return Err(BarrierError::Broken(cause.clone()));
            }
            if cancel.is_some_and(CancelHandle::is_cancelled) {
                self.break_locked(&mut state, BrokenCause::Cancelled);
                return Err(BarrierError::Cancelled);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.break_locked(&mut state, BrokenCause::TimedOut);
                return Err(BarrierError::TimedOut);
            }
        }
    }

    /// Runs the trip action and releases the cohort. Called with the state
    /// lock held by the last arrival.
    fn trip(&self, state: &mut State, ordinal: usize) -> BarrierResult<Arrival> {
        let generation = state.generation;

        let outcome = {
            let mut action = self.action.lock();
            panic::catch_unwind(AssertUnwindSafe(|| action.on_trip(generation)))
        };

        match outcome {
            Ok(Ok(())) => {
                state.arrived = 0;
                state.generation = generation.wrapping_add(1);
                self.core.released.notify_all();
                tracing::debug!("Barrier tripped: generation={}, parties={}", generation, self.parties);
                Ok(Arrival {
                    ordinal,
                    generation,
                    tripped: true,
                })
            }
            Ok(Err(err)) => {
                self.break_locked(state, BrokenCause::TripActionFailed(err.to_string()));
                Err(BarrierError::TripFailed(Box::new(err)))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.break_locked(
                    state,
                    BrokenCause::TripActionFailed(format!("trip action panicked: {message}")),
                );
                panic::resume_unwind(payload)
            }
        }
    }

    fn break_locked(&self, state: &mut State, cause: BrokenCause) {
        tracing::warn!(
            "Barrier broken: generation={}, waiting={}, cause={}",
            state.generation,
            state.arrived,
            cause
        );
        state.broken = Some(cause);
        state.arrived = 0;
        self.core.released.notify_all();
    }
}

/// Text of a panic payload, for the broken cause.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string payload"
    }
}

impl<A> fmt::Debug for CyclicBarrier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("arrived", &state.arrived)
            .field("generation", &state.generation)
            .field("broken", &state.broken)
            .finish()
    }
}
