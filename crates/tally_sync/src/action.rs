//! # Trip Actions
//!
//! The single operation a barrier runs when its last participant arrives.

use std::convert::Infallible;
use std::error::Error;

/// Work performed once per cohort by the last arriving participant.
///
/// The action runs while the barrier's state lock is held, so no participant
/// of the cohort can resume (or observe anything the action touches) until
/// it returns. Returning an error breaks the barrier.
pub trait TripAction: Send {
    /// Error produced when the action fails.
    type Error: Error + Send + Sync + 'static;

    /// Runs the action for the cohort identified by `generation`.
    ///
    /// # Errors
    ///
    /// Any error breaks the barrier for the whole cohort.
    fn on_trip(&mut self, generation: u64) -> Result<(), Self::Error>;
}

/// A trip action that does nothing. Makes the barrier a plain rendezvous.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAction;

impl TripAction for NoAction {
    type Error = Infallible;

    #[inline]
    fn on_trip(&mut self, _generation: u64) -> Result<(), Infallible> {
        Ok(())
    }
}

impl<F, E> TripAction for F
where
    F: FnMut(u64) -> Result<(), E> + Send,
    E: Error + Send + Sync + 'static,
{
    type Error = E;

    fn on_trip(&mut self, generation: u64) -> Result<(), E> {
        self(generation)
    }
}
