//! Query processing stages

use std::fmt;

use serde::{Deserialize, Serialize};

/// How far a query has been processed. Stages are ordered: a stream at a
/// later stage has had every step of the earlier stages applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Raw table columns
    FetchColumns,
    /// Filtered and, for aggregating queries, partially aggregated; safe to
    /// merge with the same stage from other sources
    WithMergeableState,
    /// Final result
    Complete,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::FetchColumns => "FetchColumns",
            ProcessingStage::WithMergeableState => "WithMergeableState",
            ProcessingStage::Complete => "Complete",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
