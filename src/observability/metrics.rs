//! Query metrics
//!
//! Monotonic counters shared by every interpreter of a context tree.
//! Relaxed atomics: values are exact once the counted work has finished.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_planned: AtomicU64,
    queries_rejected: AtomicU64,
    sets_created: AtomicU64,
    set_rows: AtomicU64,
    blocks_produced: AtomicU64,
    scans_started: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_planned(&self) {
        self.queries_planned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a filled set and its size
    pub fn record_set_created(&self, rows: u64) {
        self.sets_created.fetch_add(1, Ordering::Relaxed);
        self.set_rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_blocks_produced(&self) {
        self.blocks_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scans_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_planned: self.queries_planned.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            sets_created: self.sets_created.load(Ordering::Relaxed),
            set_rows: self.set_rows.load(Ordering::Relaxed),
            blocks_produced: self.blocks_produced.load(Ordering::Relaxed),
            scans_started: self.scans_started.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        serde_json::json!({
            "queries_planned": s.queries_planned,
            "queries_rejected": s.queries_rejected,
            "sets_created": s.sets_created,
            "set_rows": s.set_rows,
            "blocks_produced": s.blocks_produced,
            "scans_started": s.scans_started,
        })
        .to_string()
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_planned: u64,
    pub queries_rejected: u64,
    pub sets_created: u64,
    pub set_rows: u64,
    pub blocks_produced: u64,
    pub scans_started: u64,
}
