//! # Tally Error Types
//!
//! All errors that can occur while setting up or running a search.

use tally_sync::BarrierError;
use thiserror::Error;

/// Errors that can occur in the counting pipeline.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Index outside the dataset or result buffer.
    #[error("index {index} out of range (length {len})")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// Number of valid indices.
        len: usize,
    },

    /// The dataset has no rows or no columns.
    #[error("dataset is empty")]
    EmptyDataset,

    /// A row's length differs from the first row's.
    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRows {
        /// Offending row index.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        found: usize,
    },

    /// Row ranges overlap, leave gaps, or don't match the party size.
    #[error("partition invariant violated: {0}")]
    PartitionInvariantViolation(String),

    /// A result slot was written twice.
    #[error("result slot {index} written twice")]
    DoubleWrite {
        /// Slot index.
        index: usize,
    },

    /// A result slot was written after aggregation sealed the buffer.
    #[error("result slot {index} written after the buffer was sealed")]
    Sealed {
        /// Slot index.
        index: usize,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading a file or spawning a thread failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The barrier broke or the aggregation failed.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// A worker thread panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Worker index.
        worker: usize,
    },
}

/// Result type for pipeline operations.
pub type TallyResult<T> = Result<T, TallyError>;

/// Errors produced by the aggregation step.
///
/// Any of these breaks the barrier for the whole cohort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// Some result slots were never written.
    #[error("{missing} result slots unwritten, first is {first}")]
    Incomplete {
        /// Number of unwritten slots.
        missing: usize,
        /// Lowest unwritten slot index.
        first: usize,
    },

    /// The reduction overflowed.
    #[error("aggregate overflowed")]
    Overflow,
}
