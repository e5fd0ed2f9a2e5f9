//! # Barrier Error Types
//!
//! A barrier wait either releases the caller or fails with one of these.

use thiserror::Error;

/// Why a barrier entered its broken state.
///
/// A broken barrier never recovers; the cause is reported to every
/// participant that was waiting and to every later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokenCause {
    /// A waiting participant was cancelled.
    #[error("a participant was cancelled while waiting")]
    Cancelled,

    /// A participant gave up after its bounded wait expired.
    #[error("a participant timed out while waiting")]
    TimedOut,

    /// The trip action returned an error or panicked.
    #[error("trip action failed: {0}")]
    TripActionFailed(String),

    /// A participant failed before it could arrive.
    #[error("participant failed before arriving: {0}")]
    ParticipantFailed(String),
}

/// Errors returned from a barrier wait.
#[derive(Error, Debug)]
pub enum BarrierError {
    /// The barrier is broken; this caller was not the one that broke it.
    #[error("barrier is broken: {0}")]
    Broken(BrokenCause),

    /// This caller was cancelled while waiting and broke the barrier.
    #[error("wait was cancelled")]
    Cancelled,

    /// This caller's bounded wait expired and broke the barrier.
    #[error("wait timed out")]
    TimedOut,

    /// This caller was the last arrival and its trip action failed.
    #[error("trip action failed")]
    TripFailed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The cancel handle belongs to a different barrier.
    #[error("cancel handle is bound to another barrier")]
    ForeignHandle,
}

impl BarrierError {
    /// Returns the cause the barrier was broken with, as every other
    /// participant of the cohort observes it.
    #[must_use]
    pub fn cause(&self) -> Option<BrokenCause> {
        match self {
            Self::Broken(cause) => Some(cause.clone()),
            Self::Cancelled => Some(BrokenCause::Cancelled),
            Self::TimedOut => Some(BrokenCause::TimedOut),
            Self::TripFailed(source) => Some(BrokenCause::TripActionFailed(source.to_string())),
            Self::ForeignHandle => None,
        }
    }
}

/// Result type for barrier operations.
pub type BarrierResult<T> = Result<T, BarrierError>;
