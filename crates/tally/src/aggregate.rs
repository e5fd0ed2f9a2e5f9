//! # Aggregator
//!
//! The barrier's trip action. It runs once, on the last worker's thread,
//! after every slot of the result buffer has been written and before any
//! worker is released, so it reads the buffer without synchronization of
//! its own.

use std::sync::Arc;

use parking_lot::Mutex;
use tally_sync::TripAction;

use crate::error::AggregateError;
use crate::events::{EventSink, RunEvent};
use crate::results::ResultBuffer;

/// Reduces the per-row counts to a single value.
pub trait Reducer: Send {
    /// Reduces `counts`, indexed by row.
    ///
    /// # Errors
    ///
    /// Any error fails the trip and breaks the barrier.
    fn reduce(&mut self, counts: &[u64]) -> Result<u64, AggregateError>;
}

/// Sums the counts. Overflow is an error, never a wrap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl Reducer for Sum {
    fn reduce(&mut self, counts: &[u64]) -> Result<u64, AggregateError> {
        counts
            .iter()
            .try_fold(0u64, |acc, &count| acc.checked_add(count))
            .ok_or(AggregateError::Overflow)
    }
}

impl<F> Reducer for F
where
    F: FnMut(&[u64]) -> Result<u64, AggregateError> + Send,
{
    fn reduce(&mut self, counts: &[u64]) -> Result<u64, AggregateError> {
        self(counts)
    }
}

/// A reduced value and the cohort that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aggregate {
    /// Barrier generation of the cohort.
    pub generation: u64,
    /// Reduced value.
    pub total: u64,
}

/// Where the aggregator publishes its result. Clones share the slot.
#[derive(Clone, Debug, Default)]
pub struct TotalSlot {
    inner: Arc<Mutex<Option<Aggregate>>>,
}

impl TotalSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent aggregate, if any trip has completed.
    #[must_use]
    pub fn latest(&self) -> Option<Aggregate> {
        *self.inner.lock()
    }

    fn record(&self, aggregate: Aggregate) {
        *self.inner.lock() = Some(aggregate);
    }
}

/// Trip action that checks, seals and reduces the result buffer.
pub struct Aggregator<R = Sum> {
    results: Arc<ResultBuffer>,
    reducer: R,
    totals: TotalSlot,
    events: EventSink,
}

impl<R: Reducer> Aggregator<R> {
    /// Creates an aggregator over `results` publishing into `totals`.
    #[must_use]
    pub fn new(results: Arc<ResultBuffer>, reducer: R, totals: TotalSlot, events: EventSink) -> Self {
        Self {
            results,
            reducer,
            totals,
            events,
        }
    }
}

impl<R: Reducer> TripAction for Aggregator<R> {
    type Error = AggregateError;

    fn on_trip(&mut self, generation: u64) -> Result<(), AggregateError> {
        tracing::info!("Aggregator: processing results of generation {}", generation);

        let missing = self.results.missing();
        if let Some(&first) = missing.first() {
            return Err(AggregateError::Incomplete {
                missing: missing.len(),
                first,
            });
        }

        self.results.seal();
        let total = self.reducer.reduce(&self.results.snapshot())?;

        tracing::info!("Aggregator: total result {}", total);
        self.totals.record(Aggregate { generation, total });
        self.events.emit(RunEvent::Aggregated { generation, total });
        Ok(())
    }
}

impl<R> std::fmt::Debug for Aggregator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("slots", &self.results.len())
            .field("latest", &self.totals.latest())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(counts: &[u64]) -> Arc<ResultBuffer> {
        let buffer = ResultBuffer::new(counts.len());
        for (index, &count) in counts.iter().enumerate() {
            buffer.set(index, count).unwrap();
        }
        Arc::new(buffer)
    }

    #[test]
    fn test_sum() {
        assert_eq!(Sum.reduce(&[2, 1, 1, 3]), Ok(7));
        assert_eq!(Sum.reduce(&[]), Ok(0));
        assert_eq!(Sum.reduce(&[u64::MAX, 1]), Err(AggregateError::Overflow));
    }

    #[test]
    fn test_trip_records_total_and_seals() {
        let results = filled(&[2, 1, 1, 3]);
        let totals = TotalSlot::new();
        let mut aggregator = Aggregator::new(
            Arc::clone(&results),
            Sum,
            totals.clone(),
            EventSink::disabled(),
        );

        aggregator.on_trip(0).unwrap();

        assert_eq!(totals.latest(), Some(Aggregate { generation: 0, total: 7 }));
        assert!(results.is_sealed());
    }

    #[test]
    fn test_incomplete_buffer_fails() {
        let results = Arc::new(ResultBuffer::new(3));
        results.set(1, 4).unwrap();
        let totals = TotalSlot::new();
        let mut aggregator = Aggregator::new(results, Sum, totals.clone(), EventSink::disabled());

        assert_eq!(
            aggregator.on_trip(0),
            Err(AggregateError::Incomplete { missing: 2, first: 0 })
        );
        assert_eq!(totals.latest(), None);
    }

    #[test]
    fn test_injected_reducer() {
        let results = filled(&[2, 1, 1, 3]);
        let totals = TotalSlot::new();
        let max = |counts: &[u64]| Ok::<u64, AggregateError>(counts.iter().copied().max().unwrap_or(0));
        let mut aggregator = Aggregator::new(results, max, totals.clone(), EventSink::disabled());

        aggregator.on_trip(3).unwrap();
        assert_eq!(totals.latest(), Some(Aggregate { generation: 3, total: 3 }));
    }
}
