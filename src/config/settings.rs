//! Query settings
//!
//! Limits and modes consulted while planning and executing a query. Every
//! field has a default so a settings file only needs the values it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

use super::errors::ConfigError;

/// What to do when a row limit is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// Fail the query
    #[default]
    Throw,
    /// Stop consuming input and return what has been gathered
    Break,
    /// GROUP BY only: keep existing keys, route new ones to the overflow row
    Any,
}

/// Which rows the WITH TOTALS row is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalsMode {
    /// Every row after WHERE, including the overflow row
    #[default]
    BeforeHaving,
    /// Groups passing HAVING plus the overflow row
    AfterHavingInclusive,
    /// Groups passing HAVING only
    AfterHavingExclusive,
    /// Groups passing HAVING, plus the overflow row when enough groups pass
    AfterHavingAuto,
}

/// Settings shared by every interpreter of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Rows per block produced by sources and sorting (default: 65536)
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,

    /// Upper bound on parallel streams per scan (default: 8)
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Deepest allowed subquery nesting (default: 100)
    #[serde(default = "default_max_subquery_depth")]
    pub max_subquery_depth: usize,

    /// Distinct GROUP BY keys allowed; 0 means unlimited
    #[serde(default)]
    pub max_rows_to_group_by: usize,

    #[serde(default)]
    pub group_by_overflow_mode: OverflowMode,

    #[serde(default)]
    pub totals_mode: TotalsMode,

    /// Share of groups that must pass HAVING for `AfterHavingAuto` to
    /// include the overflow row (default: 0.5)
    #[serde(default = "default_totals_auto_threshold")]
    pub totals_auto_threshold: f64,

    /// Keys allowed in one IN set; 0 means unlimited
    #[serde(default)]
    pub max_rows_in_set: usize,

    #[serde(default)]
    pub set_overflow_mode: OverflowMode,

    /// Rows DISTINCT may keep; 0 means unlimited
    #[serde(default)]
    pub max_rows_in_distinct: usize,

    #[serde(default)]
    pub distinct_overflow_mode: OverflowMode,

    /// Lowest severity written to the log (default: warn)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_max_block_size() -> usize {
    65536
}

fn default_max_threads() -> usize {
    8
}

fn default_max_subquery_depth() -> usize {
    100
}

fn default_totals_auto_threshold() -> f64 {
    0.5
}

fn default_log_level() -> Severity {
    Severity::Warn
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_block_size: default_max_block_size(),
            max_threads: default_max_threads(),
            max_subquery_depth: default_max_subquery_depth(),
            max_rows_to_group_by: 0,
            group_by_overflow_mode: OverflowMode::Throw,
            totals_mode: TotalsMode::BeforeHaving,
            totals_auto_threshold: default_totals_auto_threshold(),
            max_rows_in_set: 0,
            set_overflow_mode: OverflowMode::Throw,
            max_rows_in_distinct: 0,
            distinct_overflow_mode: OverflowMode::Throw,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file and validates them
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_size == 0 {
            return Err(ConfigError::Invalid("max_block_size must be positive".into()));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid("max_threads must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.totals_auto_threshold) {
            return Err(ConfigError::Invalid(format!(
                "totals_auto_threshold must be within [0, 1], got {}",
                self.totals_auto_threshold
            )));
        }
        Ok(())
    }

    /// Whether aggregation routes keys beyond the limit into an overflow row
    /// for a query with the given WITH TOTALS flag.
    pub fn overflow_row(&self, with_totals: bool) -> bool {
        with_totals
            && self.max_rows_to_group_by > 0
            && self.group_by_overflow_mode == OverflowMode::Any
            && self.totals_mode != TotalsMode::AfterHavingExclusive
    }
}
