//! # Result Buffer
//!
//! One count slot per dataset row. Workers write disjoint slots without a
//! lock; the barrier trip orders every write before the aggregator reads.
//!
//! ## Slot Lifecycle
//!
//! ```text
//!   unwritten ──set()──> written ──seal()──> read-only
//!                          │
//!                          └──set() again──> DoubleWrite
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{TallyError, TallyResult};

/// Fixed-size, write-once-per-slot array of per-row counts.
#[derive(Debug)]
pub struct ResultBuffer {
    counts: Box<[AtomicU64]>,
    written: Box<[AtomicBool]>,
    sealed: AtomicBool,
}

impl ResultBuffer {
    /// Creates a zeroed buffer with `len` slots.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            counts: (0..len).map(|_| AtomicU64::new(0)).collect(),
            written: (0..len).map(|_| AtomicBool::new(false)).collect(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the buffer has no slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Writes `value` into slot `index`. Each slot accepts one write.
    ///
    /// # Errors
    ///
    /// [`TallyError::OutOfRange`] for a bad index, [`TallyError::Sealed`]
    /// after [`seal`](Self::seal), [`TallyError::DoubleWrite`] if the slot
    /// was already written.
    pub fn set(&self, index: usize, value: u64) -> TallyResult<()> {
        let written = self.written.get(index).ok_or(TallyError::OutOfRange {
            index,
            len: self.len(),
        })?;
        if self.sealed.load(Ordering::Acquire) {
            return Err(TallyError::Sealed { index });
        }
        if written.swap(true, Ordering::AcqRel) {
            return Err(TallyError::DoubleWrite { index });
        }
        // Visibility to the reader comes from the barrier trip.
        self.counts[index].store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Marks the buffer read-only. Idempotent.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Returns true once the buffer is read-only.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Indices of slots that have not been written.
    #[must_use]
    pub fn missing(&self) -> Vec<usize> {
        self.written
            .iter()
            .enumerate()
            .filter(|(_, written)| !written.load(Ordering::Acquire))
            .map(|(index, _)| index)
            .collect()
    }

    /// Copies out every slot.
    ///
    /// Only meaningful after the barrier has tripped; before that, slots of
    /// workers still scanning read as zero.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_initialized() {
        let buffer = ResultBuffer::new(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.snapshot(), vec![0, 0, 0, 0]);
        assert_eq!(buffer.missing(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_set_and_snapshot() {
        let buffer = ResultBuffer::new(3);
        buffer.set(0, 2).unwrap();
        buffer.set(2, 5).unwrap();
        assert_eq!(buffer.snapshot(), vec![2, 0, 5]);
        assert_eq!(buffer.missing(), vec![1]);
    }

    #[test]
    fn test_double_write_detected() {
        let buffer = ResultBuffer::new(2);
        buffer.set(1, 3).unwrap();
        assert!(matches!(buffer.set(1, 4), Err(TallyError::DoubleWrite { index: 1 })));
        assert_eq!(buffer.snapshot()[1], 3);
    }

    #[test]
    fn test_out_of_range() {
        let buffer = ResultBuffer::new(2);
        assert!(matches!(
            buffer.set(2, 1),
            Err(TallyError::OutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_sealed_rejects_writes_and_reads_are_stable() {
        let buffer = ResultBuffer::new(2);
        buffer.set(0, 1).unwrap();
        buffer.seal();
        buffer.seal();
        assert!(buffer.is_sealed());
        assert!(matches!(buffer.set(1, 9), Err(TallyError::Sealed { index: 1 })));

        let first = buffer.snapshot();
        for _ in 0..10 {
            assert_eq!(buffer.snapshot(), first);
        }
    }
}
