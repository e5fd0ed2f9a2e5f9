//! # Worker
//!
//! Scans one row range, writes a count per row, then waits at the barrier.
//!
//! ```text
//!   Scanning ──(all rows written)──> AwaitingBarrier ──(trip)──> Released
//!      │                                   │
//!      └──(scan error: abort barrier)──────┴──(broken / cancelled / timeout)──> Broken
//! ```
//!
//! The barrier wait is the only point where a worker blocks. A worker that
//! fails or panics before arriving breaks the barrier, since a missing row
//! makes the aggregate meaningless.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tally_sync::{Arrival, CancelHandle, CyclicBarrier};

use crate::aggregate::{Aggregator, Reducer, Sum};
use crate::dataset::Dataset;
use crate::error::TallyResult;
use crate::events::{EventSink, RunEvent};
use crate::partition::RowRange;
use crate::results::ResultBuffer;

/// The barrier every worker of a run shares, with the aggregator as its
/// trip action.
pub type SearchBarrier<R = Sum> = CyclicBarrier<Aggregator<R>>;

/// Where a worker is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Counting its rows.
    Scanning,
    /// Suspended at the barrier.
    AwaitingBarrier,
    /// Passed the barrier after a successful trip.
    Released,
    /// Ended without passing the barrier.
    Broken,
}

/// What a worker reports when it finishes.
#[derive(Debug)]
pub struct WorkerOutcome {
    /// Worker index.
    pub worker: usize,
    /// Rows assigned to it.
    pub range: RowRange,
    /// Rows it wrote before stopping.
    pub rows_scanned: usize,
    /// Terminal state, `Released` or `Broken`.
    pub state: WorkerState,
    /// The barrier arrival, or why there wasn't one.
    pub result: TallyResult<Arrival>,
}

impl WorkerOutcome {
    /// Returns true if the worker passed the barrier.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state == WorkerState::Released
    }
}

/// Counts entries equal to `target` in one row.
#[inline]
#[must_use]
pub fn count_in_row(row: &[i32], target: i32) -> u64 {
    row.iter().filter(|&&value| value == target).count() as u64
}

/// One party of a search run.
pub struct Worker<R: Reducer = Sum> {
    id: usize,
    range: RowRange,
    target: i32,
    dataset: Arc<Dataset>,
    results: Arc<ResultBuffer>,
    barrier: Arc<SearchBarrier<R>>,
    cancel: CancelHandle,
    wait_timeout: Option<Duration>,
    events: EventSink,
}

impl<R: Reducer> Worker<R> {
    /// Creates worker `id` for `range`, counting `target`.
    #[must_use]
    pub fn new(
        id: usize,
        range: RowRange,
        target: i32,
        dataset: Arc<Dataset>,
        results: Arc<ResultBuffer>,
        barrier: Arc<SearchBarrier<R>>,
        events: EventSink,
    ) -> Self {
        let cancel = barrier.cancel_handle();
        Self {
            id,
            range,
            target,
            dataset,
            results,
            barrier,
            cancel,
            wait_timeout: None,
            events,
        }
    }

    /// Bounds the barrier wait. An expired wait breaks the barrier.
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Handle that cancels this worker's barrier wait.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Scans the range, then waits for the rest of the party.
    pub fn run(self) -> WorkerOutcome {
        let _guard = AbortOnPanic {
            barrier: Arc::clone(&self.barrier),
            worker: self.id,
        };

        tracing::info!(
            "Worker {}: processing rows {} to {}",
            self.id,
            self.range.start,
            self.range.end
        );
        self.events.emit(RunEvent::WorkerStarted {
            worker: self.id,
            range: self.range,
        });

        let mut rows_scanned = 0;
        if let Err(err) = self.scan(&mut rows_scanned) {
            tracing::error!("Worker {}: scan failed: {}", self.id, err);
            self.barrier.abort(format!("worker {}: {err}", self.id));
            return self.finish(rows_scanned, Err(err));
        }

        tracing::debug!("Worker {}: rows processed", self.id);
        self.events.emit(RunEvent::RowsProcessed {
            worker: self.id,
            rows: rows_scanned,
        });

        // AwaitingBarrier: RowsProcessed marks the transition for observers.
        let waited = match self.wait_timeout {
            Some(timeout) => self.barrier.wait_cancellable_timeout(&self.cancel, timeout),
            None => self.barrier.wait_cancellable(&self.cancel),
        };
        self.finish(rows_scanned, waited.map_err(Into::into))
    }

    fn scan(&self, rows_scanned: &mut usize) -> TallyResult<()> {
        for index in self.range.indices() {
            let row = self.dataset.row(index)?;
            self.results.set(index, count_in_row(row, self.target))?;
            *rows_scanned += 1;
        }
        Ok(())
    }

    fn finish(self, rows_scanned: usize, result: TallyResult<Arrival>) -> WorkerOutcome {
        let state = match &result {
            Ok(arrival) => {
                tracing::info!("Worker {}: released, ordinal {}", self.id, arrival.ordinal);
                self.events.emit(RunEvent::WorkerReleased {
                    worker: self.id,
                    ordinal: arrival.ordinal,
                });
                WorkerState::Released
            }
            Err(err) => {
                tracing::warn!("Worker {}: broken: {}", self.id, err);
                self.events.emit(RunEvent::WorkerBroken {
                    worker: self.id,
                    reason: err.to_string(),
                });
                WorkerState::Broken
            }
        };

        WorkerOutcome {
            worker: self.id,
            range: self.range,
            rows_scanned,
            state,
            result,
        }
    }
}

/// Breaks the barrier if the worker thread unwinds.
struct AbortOnPanic<R: Reducer> {
    barrier: Arc<SearchBarrier<R>>,
    worker: usize,
}

impl<R: Reducer> Drop for AbortOnPanic<R> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.barrier.abort(format!("worker {} panicked", self.worker));
        }
    }
}
