//! # Run Events
//!
//! Advisory progress messages from workers and the aggregator. Delivery
//! order across workers is unspecified and a missing receiver is fine.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tally_sync::BrokenCause;

use crate::partition::RowRange;

/// Something that happened during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// A worker started scanning its range.
    WorkerStarted {
        /// Worker index.
        worker: usize,
        /// Assigned rows.
        range: RowRange,
    },
    /// A worker finished scanning and is heading to the barrier.
    RowsProcessed {
        /// Worker index.
        worker: usize,
        /// Rows scanned.
        rows: usize,
    },
    /// A worker passed the barrier.
    WorkerReleased {
        /// Worker index.
        worker: usize,
        /// Arrival order within the cohort.
        ordinal: usize,
    },
    /// A worker ended without passing the barrier.
    WorkerBroken {
        /// Worker index.
        worker: usize,
        /// What went wrong.
        reason: String,
    },
    /// The aggregator produced a total.
    Aggregated {
        /// Cohort generation.
        generation: u64,
        /// Reduced value.
        total: u64,
    },
    /// The barrier broke before the trip.
    BarrierBroken {
        /// Why it broke.
        cause: BrokenCause,
    },
}

/// Sending side of the event channel. The default sink discards events.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<Sender<RunEvent>>,
}

impl EventSink {
    /// A sink that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Sends `event` if anyone is listening.
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is reporting.
            let _ = tx.send(event);
        }
    }
}

/// Creates a connected sink and receiver.
#[must_use]
pub fn event_channel() -> (EventSink, Receiver<RunEvent>) {
    let (tx, rx) = unbounded();
    (EventSink { tx: Some(tx) }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_delivers() {
        let (sink, rx) = event_channel();
        sink.emit(RunEvent::RowsProcessed { worker: 1, rows: 10 });
        assert_eq!(
            rx.try_recv().unwrap(),
            RunEvent::RowsProcessed { worker: 1, rows: 10 }
        );
    }

    #[test]
    fn test_emit_without_receiver_is_silent() {
        let (sink, rx) = event_channel();
        drop(rx);
        sink.emit(RunEvent::Aggregated { generation: 0, total: 7 });
        EventSink::disabled().emit(RunEvent::Aggregated { generation: 0, total: 7 });
    }
}
