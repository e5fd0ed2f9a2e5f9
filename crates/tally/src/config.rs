//! # Configuration
//!
//! Loaded once at startup from TOML. Every value is validated here so that a
//! bad setup fails before any worker is spawned.
//!
//! ```toml
//! [dataset]
//! rows = 10000
//! columns = 1000
//! max_value = 10
//! seed = 20240601
//!
//! [search]
//! target = 5
//! participants = 5
//! wait_timeout_ms = 30000
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TallyError, TallyResult};

/// Shape and contents of the generated dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns per row.
    pub columns: usize,
    /// Values are drawn from `[0, max_value)`.
    pub max_value: i32,
    /// RNG seed; equal seeds give equal datasets.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            rows: 10_000,
            columns: 1_000,
            max_value: 10,
            seed: 0x7A11,
        }
    }
}

/// How the search is run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Value to count.
    pub target: i32,
    /// Number of workers, and the barrier's party size.
    pub participants: usize,
    /// Bounded barrier wait; absent means wait forever.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            target: 5,
            participants: 5,
            wait_timeout_ms: None,
        }
    }
}

impl SearchConfig {
    /// Party size as a non-zero count.
    ///
    /// # Errors
    ///
    /// [`TallyError::InvalidConfig`] if `participants` is zero.
    pub fn parties(&self) -> TallyResult<NonZeroUsize> {
        NonZeroUsize::new(self.participants)
            .ok_or_else(|| TallyError::InvalidConfig("participants must be at least 1".to_string()))
    }

    /// Barrier wait bound, if configured.
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TallyConfig {
    /// Dataset generation.
    pub dataset: DatasetConfig,
    /// Search parameters.
    pub search: SearchConfig,
}

impl TallyConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`TallyError::ConfigParse`] on malformed TOML, otherwise any error
    /// from [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> TallyResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`TallyError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> TallyResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks the configuration describes a runnable search.
    ///
    /// # Errors
    ///
    /// [`TallyError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> TallyResult<()> {
        let invalid = |msg: String| Err(TallyError::InvalidConfig(msg));

        if self.dataset.rows == 0 || self.dataset.columns == 0 {
            return invalid(format!(
                "dataset must be non-empty, got {}x{}",
                self.dataset.rows, self.dataset.columns
            ));
        }
        if self.dataset.max_value <= 0 {
            return invalid(format!(
                "max_value must be positive, got {}",
                self.dataset.max_value
            ));
        }
        let parties = self.search.parties()?;
        if parties.get() > self.dataset.rows {
            return invalid(format!(
                "{} participants for {} rows",
                parties, self.dataset.rows
            ));
        }
        if self.search.wait_timeout_ms == Some(0) {
            return invalid("wait_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}
