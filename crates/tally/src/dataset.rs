//! # Dataset
//!
//! An immutable table of integers, stored row-major in one allocation.
//! Shared read-only between workers; no locking.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::DatasetConfig;
use crate::error::{TallyError, TallyResult};

/// Read-only 2D table of integers with equal-length rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    /// Row-major cells, `rows * columns` long.
    cells: Vec<i32>,
    rows: usize,
    columns: usize,
}

impl Dataset {
    /// Builds a dataset from explicit rows.
    ///
    /// # Errors
    ///
    /// [`TallyError::EmptyDataset`] if there are no rows or no columns,
    /// [`TallyError::RaggedRows`] if rows differ in length.
    pub fn from_rows(rows: Vec<Vec<i32>>) -> TallyResult<Self> {
        let columns = rows.first().map_or(0, Vec::len);
        if columns == 0 {
            return Err(TallyError::EmptyDataset);
        }

        let row_count = rows.len();
        let mut cells = Vec::with_capacity(row_count * columns);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != columns {
                return Err(TallyError::RaggedRows {
                    row,
                    expected: columns,
                    found: values.len(),
                });
            }
            cells.extend(values);
        }

        Ok(Self {
            cells,
            rows: row_count,
            columns,
        })
    }

    /// Fills a dataset with values in `[0, max_value)` from a seeded RNG.
    ///
    /// The same config always produces the same table.
    ///
    /// # Errors
    ///
    /// [`TallyError::EmptyDataset`] for zero rows or columns,
    /// [`TallyError::InvalidConfig`] if `max_value` is not positive.
    pub fn generate(config: &DatasetConfig) -> TallyResult<Self> {
        if config.rows == 0 || config.columns == 0 {
            return Err(TallyError::EmptyDataset);
        }
        if config.max_value <= 0 {
            return Err(TallyError::InvalidConfig(format!(
                "max_value must be positive, got {}",
                config.max_value
            )));
        }

        let len = config
            .rows
            .checked_mul(config.columns)
            .ok_or_else(|| TallyError::InvalidConfig("dataset too large".to_string()))?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let cells = (0..len).map(|_| rng.gen_range(0..config.max_value)).collect();

        Ok(Self {
            cells,
            rows: config.rows,
            columns: config.columns,
        })
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns in every row.
    #[inline]
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Returns row `index`.
    ///
    /// # Errors
    ///
    /// [`TallyError::OutOfRange`] if `index >= rows()`.
    pub fn row(&self, index: usize) -> TallyResult<&[i32]> {
        if index >= self.rows {
            return Err(TallyError::OutOfRange {
                index,
                len: self.rows,
            });
        }
        let start = index * self.columns;
        Ok(&self.cells[start..start + self.columns])
    }

    /// Counts occurrences of `target` across the whole table, single-threaded.
    #[must_use]
    pub fn count_value(&self, target: i32) -> u64 {
        self.cells.iter().filter(|&&value| value == target).count() as u64
    }
}
