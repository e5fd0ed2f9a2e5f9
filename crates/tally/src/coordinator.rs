//! # Coordinator
//!
//! Sets up one run: result buffer, aggregator, barrier, and one named OS
//! thread per worker. Launching returns immediately; the caller either
//! [`join`](SearchRun::join)s to observe the aggregate or
//! [`detach`](SearchRun::detach)es and lets the workers finish on their own.
//!
//! ## Architecture
//!
//! ```text
//!   SearchRun::launch
//!        │
//!        ├── partition rows ──> [R0) [R1) ... [Rn)      (validated, disjoint)
//!        │
//!        ├── tally-worker-0 ──scan R0──┐
//!        ├── tally-worker-1 ──scan R1──┼──> CyclicBarrier ──(last arrival)──> Aggregator
//!        └── tally-worker-n ──scan Rn──┘                                         │
//!                                                                            TotalSlot
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tally_sync::{BarrierError, BrokenCause, CancelHandle, CyclicBarrier};

use crate::aggregate::{Aggregate, Aggregator, Reducer, Sum, TotalSlot};
use crate::config::{SearchConfig, TallyConfig};
use crate::dataset::Dataset;
use crate::error::{TallyError, TallyResult};
use crate::events::{EventSink, RunEvent};
use crate::partition::{partition_rows, validate_partition, RowRange};
use crate::results::ResultBuffer;
use crate::worker::{SearchBarrier, Worker, WorkerOutcome, WorkerState};

/// What to search for and how to split the work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchPlan {
    /// Value to count.
    pub target: i32,
    /// Number of workers and barrier parties.
    pub parties: NonZeroUsize,
    /// Explicit row ranges, one per party. Even split when absent.
    pub ranges: Option<Vec<RowRange>>,
    /// Bounded barrier wait for every worker.
    pub wait_timeout: Option<Duration>,
}

impl SearchPlan {
    /// Plan with an even split and unbounded waits.
    #[must_use]
    pub fn new(target: i32, parties: NonZeroUsize) -> Self {
        Self {
            target,
            parties,
            ranges: None,
            wait_timeout: None,
        }
    }

    /// Plan from the `[search]` config section.
    ///
    /// # Errors
    ///
    /// [`TallyError::InvalidConfig`] if `participants` is zero.
    pub fn from_config(config: &SearchConfig) -> TallyResult<Self> {
        Ok(Self::new(config.target, config.parties()?).with_wait_timeout(config.wait_timeout()))
    }

    /// Uses explicit row ranges instead of an even split.
    #[must_use]
    pub fn with_ranges(mut self, ranges: Vec<RowRange>) -> Self {
        self.ranges = Some(ranges);
        self
    }

    /// Bounds every worker's barrier wait.
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Resolves and validates the row ranges for a dataset of `rows` rows.
    ///
    /// # Errors
    ///
    /// [`TallyError::PartitionInvariantViolation`] if the ranges overlap,
    /// leave gaps, or their count differs from the party size.
    pub fn resolve_ranges(&self, rows: usize) -> TallyResult<Vec<RowRange>> {
        let ranges = match &self.ranges {
            Some(ranges) => ranges.clone(),
            None => partition_rows(rows, self.parties)?,
        };
        if ranges.len() != self.parties.get() {
            return Err(TallyError::PartitionInvariantViolation(format!(
                "{} ranges for {} parties",
                ranges.len(),
                self.parties
            )));
        }
        validate_partition(&ranges, rows)?;
        Ok(ranges)
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every worker arrived and the aggregator ran.
    Completed {
        /// Barrier generation of the cohort.
        generation: u64,
        /// Aggregated value.
        total: u64,
    },
    /// The barrier broke before the trip; no aggregate exists.
    BrokenBeforeTrip {
        /// Why it broke.
        cause: BrokenCause,
    },
    /// Every worker arrived but the aggregator failed or panicked.
    TripFailed {
        /// The aggregator's error, as recorded by the barrier.
        cause: BrokenCause,
    },
}

/// Everything observed by joining a run.
#[derive(Debug)]
pub struct RunReport {
    /// Final status.
    pub status: RunStatus,
    /// One outcome per worker, ordered by worker index.
    pub outcomes: Vec<WorkerOutcome>,
    /// Per-row counts as the workers left them.
    pub counts: Vec<u64>,
}

impl RunReport {
    /// The aggregate, if the run completed.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        match self.status {
            RunStatus::Completed { total, .. } => Some(total),
            RunStatus::BrokenBeforeTrip { .. } | RunStatus::TripFailed { .. } => None,
        }
    }

    /// Returns true if the aggregator ran.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed { .. })
    }
}

/// A launched run.
pub struct SearchRun<R: Reducer = Sum> {
    handles: Vec<JoinHandle<WorkerOutcome>>,
    ranges: Vec<RowRange>,
    cancels: Vec<CancelHandle>,
    barrier: Arc<SearchBarrier<R>>,
    results: Arc<ResultBuffer>,
    totals: TotalSlot,
    events: EventSink,
}

impl SearchRun<Sum> {
    /// Launches a summing run.
    ///
    /// # Errors
    ///
    /// As [`launch_with`](Self::launch_with).
    pub fn launch(dataset: Arc<Dataset>, plan: &SearchPlan, events: EventSink) -> TallyResult<Self> {
        Self::launch_with(dataset, plan, Sum, events)
    }
}

impl<R: Reducer + 'static> SearchRun<R> {
    /// Validates the plan and starts one worker thread per party.
    ///
    /// # Errors
    ///
    /// [`TallyError::PartitionInvariantViolation`] for a bad plan, before any
    /// thread starts. [`TallyError::Io`] if a thread cannot be spawned; the
    /// barrier is broken so already-started workers end promptly.
    pub fn launch_with(
        dataset: Arc<Dataset>,
        plan: &SearchPlan,
        reducer: R,
        events: EventSink,
    ) -> TallyResult<Self> {
        let ranges = plan.resolve_ranges(dataset.rows())?;

        let results = Arc::new(ResultBuffer::new(dataset.rows()));
        let totals = TotalSlot::new();
        let aggregator = Aggregator::new(
            Arc::clone(&results),
            reducer,
            totals.clone(),
            events.clone(),
        );
        let barrier = Arc::new(CyclicBarrier::new(plan.parties, aggregator));

        tracing::info!(
            "Launching {} workers over {} rows, target {}",
            plan.parties,
            dataset.rows(),
            plan.target
        );

        let mut handles = Vec::with_capacity(ranges.len());
        let mut cancels = Vec::with_capacity(ranges.len());
        for (id, &range) in ranges.iter().enumerate() {
            let worker = Worker::new(
                id,
                range,
                plan.target,
                Arc::clone(&dataset),
                Arc::clone(&results),
                Arc::clone(&barrier),
                events.clone(),
            )
            .with_wait_timeout(plan.wait_timeout);
            cancels.push(worker.cancel_handle());

            let spawned = thread::Builder::new()
                .name(format!("tally-worker-{id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    barrier.abort(format!("failed to spawn worker {id}: {err}"));
                    return Err(TallyError::Io(err));
                }
            }
        }

        Ok(Self {
            handles,
            ranges,
            cancels,
            barrier,
            results,
            totals,
            events,
        })
    }

    /// Number of workers launched.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Cancels worker `worker`'s barrier wait, breaking the barrier for the
    /// rest of the party.
    ///
    /// Returns false for an unknown worker, or once the barrier has tripped:
    /// released workers are past their only wait and the aggregate stands.
    /// A cancel issued before the worker arrives takes effect on arrival.
    pub fn cancel(&self, worker: usize) -> bool {
        let Some(cancel) = self.cancels.get(worker) else {
            return false;
        };
        if self.totals.latest().is_some() {
            tracing::debug!("Main: cancel of worker {} after the trip ignored", worker);
            return false;
        }
        cancel.cancel();
        true
    }

    /// The aggregate, if the trip has already happened.
    #[must_use]
    pub fn aggregate(&self) -> Option<Aggregate> {
        self.totals.latest()
    }

    /// Returns without waiting; workers keep running to completion.
    pub fn detach(self) {
        tracing::info!("Main: detached from {} workers", self.handles.len());
    }

    /// Waits for every worker and reports how the run ended.
    ///
    /// # Errors
    ///
    /// [`TallyError::WorkerPanicked`] if a worker thread panicked outside
    /// the aggregator. A broken barrier is not an error here; it is reported
    /// as [`RunStatus::BrokenBeforeTrip`], or [`RunStatus::TripFailed`] when
    /// the aggregator itself failed.
    pub fn join(self) -> TallyResult<RunReport> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        let mut panicked = None;

        for ((worker, handle), range) in self.handles.into_iter().enumerate().zip(self.ranges) {
            match handle.join() {
                Ok(outcome) => outcomes.push(outcome),
                Err(_) => match self.barrier.broken_cause() {
                    // The tripping worker unwinds with the aggregator's panic
                    // after scanning its whole range.
                    Some(cause @ BrokenCause::TripActionFailed(_)) => {
                        tracing::warn!("Worker {}: aggregator panicked on its thread", worker);
                        outcomes.push(WorkerOutcome {
                            worker,
                            range,
                            rows_scanned: range.len(),
                            state: WorkerState::Broken,
                            result: Err(TallyError::Barrier(BarrierError::Broken(cause))),
                        });
                    }
                    _ => {
                        tracing::error!("Worker {} panicked", worker);
                        panicked.get_or_insert(worker);
                    }
                },
            }
        }
        if let Some(worker) = panicked {
            return Err(TallyError::WorkerPanicked { worker });
        }

        let status = match (self.totals.latest(), self.barrier.broken_cause()) {
            (Some(Aggregate { generation, total }), _) => RunStatus::Completed { generation, total },
            (None, Some(cause @ BrokenCause::TripActionFailed(_))) => {
                self.events.emit(RunEvent::BarrierBroken {
                    cause: cause.clone(),
                });
                RunStatus::TripFailed { cause }
            }
            (None, Some(cause)) => {
                self.events.emit(RunEvent::BarrierBroken {
                    cause: cause.clone(),
                });
                RunStatus::BrokenBeforeTrip { cause }
            }
            // Every worker returned, so the barrier either tripped or broke.
            (None, None) => RunStatus::BrokenBeforeTrip {
                cause: BrokenCause::ParticipantFailed("no worker reached the barrier".to_string()),
            },
        };

        match &status {
            RunStatus::Completed { total, .. } => tracing::info!("Run complete: total {}", total),
            RunStatus::BrokenBeforeTrip { cause } => tracing::warn!("Run broken before trip: {}", cause),
            RunStatus::TripFailed { cause } => tracing::error!("Run aggregation failed: {}", cause),
        }

        Ok(RunReport {
            status,
            outcomes,
            counts: self.results.snapshot(),
        })
    }
}

/// Generates the configured dataset, runs the search and joins it.
///
/// # Errors
///
/// Any setup error from the config, dataset or plan, or
/// [`TallyError::WorkerPanicked`].
pub fn run_config(config: &TallyConfig, events: EventSink) -> TallyResult<RunReport> {
    config.validate()?;
    let dataset = Arc::new(Dataset::generate(&config.dataset)?);
    let plan = SearchPlan::from_config(&config.search)?;
    SearchRun::launch(dataset, &plan, events)?.join()
}
