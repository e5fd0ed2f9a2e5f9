//! # TALLY
//!
//! Counts occurrences of a target value in a read-only table by splitting
//! the rows among a fixed party of worker threads. Workers scan in parallel
//! without locks, meet at one [`CyclicBarrier`](tally_sync::CyclicBarrier),
//! and the last to arrive runs the aggregator before anyone is released.
//!
//! ## Design Principles
//!
//! 1. **Disjoint writes** - row ranges partition the table, so the result
//!    buffer needs no lock
//! 2. **Exactly-once aggregation** - the aggregator is the barrier's trip
//!    action, not something a worker decides to run
//! 3. **No silent partial results** - any worker failure, cancellation or
//!    timeout breaks the barrier for the whole party
//! 4. **Setup fails early** - bad configs and bad partitions are rejected
//!    before a thread is spawned
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use tally::{Dataset, EventSink, SearchPlan, SearchRun};
//!
//! let dataset = Arc::new(Dataset::from_rows(vec![
//!     vec![5, 5, 1],
//!     vec![5, 2, 2],
//!     vec![1, 1, 5],
//!     vec![5, 5, 5],
//! ])?);
//! let plan = SearchPlan::new(5, NonZeroUsize::new(2).unwrap());
//!
//! let report = SearchRun::launch(dataset, &plan, EventSink::disabled())?.join()?;
//! assert_eq!(report.total(), Some(7));
//! # Ok::<(), tally::TallyError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod events;
pub mod partition;
pub mod results;
pub mod worker;

pub use aggregate::{Aggregate, Aggregator, Reducer, Sum, TotalSlot};
pub use config::{DatasetConfig, SearchConfig, TallyConfig};
pub use coordinator::{run_config, RunReport, RunStatus, SearchPlan, SearchRun};
pub use dataset::Dataset;
pub use error::{AggregateError, TallyError, TallyResult};
pub use events::{event_channel, EventSink, RunEvent};
pub use partition::{partition_rows, validate_partition, RowRange};
pub use results::ResultBuffer;
pub use worker::{count_in_row, SearchBarrier, Worker, WorkerOutcome, WorkerState};
