//! # Row Partitioning
//!
//! Splits `[0, rows)` into one contiguous range per worker. Ranges never
//! overlap and leave no gaps, which is what lets workers write the result
//! buffer without a lock.

use std::num::NonZeroUsize;
use std::ops::Range;

use crate::error::{TallyError, TallyResult};

/// Half-open range of row indices assigned to one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RowRange {
    /// First row, inclusive.
    pub start: usize,
    /// Last row, exclusive.
    pub end: usize,
}

impl RowRange {
    /// Creates the range `[start, end)`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of rows in the range.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the range holds no rows.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Row indices in the range.
    #[inline]
    #[must_use]
    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for RowRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Splits `rows` into `parties` contiguous ranges of near-equal size.
///
/// The first `rows % parties` ranges get one extra row.
///
/// # Errors
///
/// [`TallyError::PartitionInvariantViolation`] if there are more parties than
/// rows, since some worker would have nothing to write.
pub fn partition_rows(rows: usize, parties: NonZeroUsize) -> TallyResult<Vec<RowRange>> {
    let parties = parties.get();
    if parties > rows {
        return Err(TallyError::PartitionInvariantViolation(format!(
            "{parties} parties for {rows} rows"
        )));
    }

    let base = rows / parties;
    let extra = rows % parties;
    let mut start = 0;

    let ranges = (0..parties)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = RowRange::new(start, start + len);
            start += len;
            range
        })
        .collect();

    Ok(ranges)
}

/// Checks that `ranges` exactly cover `[0, rows)` without overlap.
///
/// Order of `ranges` does not matter.
///
/// # Errors
///
/// [`TallyError::PartitionInvariantViolation`] naming the first problem found.
pub fn validate_partition(ranges: &[RowRange], rows: usize) -> TallyResult<()> {
    let violation = |msg: String| Err(TallyError::PartitionInvariantViolation(msg));

    if ranges.is_empty() {
        return violation("no ranges".to_string());
    }
    if let Some(empty) = ranges.iter().find(|r| r.is_empty()) {
        return violation(format!("empty range {empty}"));
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_unstable_by_key(|r| r.start);

    let mut expected = 0;
    for range in &sorted {
        if range.start < expected {
            return violation(format!("range {range} overlaps rows before {expected}"));
        }
        if range.start > expected {
            return violation(format!("rows [{expected}, {}) not covered", range.start));
        }
        expected = range.end;
    }

    if expected != rows {
        return violation(format!("ranges end at {expected}, dataset has {rows} rows"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_even_split() {
        let ranges = partition_rows(10_000, parties(5)).unwrap();
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0], RowRange::new(0, 2000));
        assert_eq!(ranges[4], RowRange::new(8000, 10_000));
    }

    #[test]
    fn test_remainder_goes_to_first_ranges() {
        let ranges = partition_rows(10, parties(4)).unwrap();
        let lens: Vec<usize> = ranges.iter().map(RowRange::len).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_split_always_valid() {
        for rows in 1..60 {
            for p in 1..=rows.min(13) {
                let ranges = partition_rows(rows, parties(p)).unwrap();
                assert_eq!(ranges.len(), p);
                validate_partition(&ranges, rows).unwrap();
            }
        }
    }

    #[test]
    fn test_too_many_parties() {
        assert!(matches!(
            partition_rows(3, parties(4)),
            Err(TallyError::PartitionInvariantViolation(_))
        ));
    }

    #[test]
    fn test_validate_accepts_unordered() {
        let ranges = [RowRange::new(2, 4), RowRange::new(0, 2)];
        validate_partition(&ranges, 4).unwrap();
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let ranges = [RowRange::new(0, 3), RowRange::new(2, 4)];
        assert!(validate_partition(&ranges, 4).is_err());
    }

    #[test]
    fn test_validate_rejects_gap() {
        let ranges = [RowRange::new(0, 1), RowRange::new(2, 4)];
        assert!(validate_partition(&ranges, 4).is_err());
    }

    #[test]
    fn test_validate_rejects_short_cover_and_empty() {
        assert!(validate_partition(&[RowRange::new(0, 3)], 4).is_err());
        assert!(validate_partition(&[RowRange::new(0, 5)], 4).is_err());
        assert!(validate_partition(&[RowRange::new(0, 4), RowRange::new(4, 4)], 4).is_err());
        assert!(validate_partition(&[], 4).is_err());
    }
}
