//! Observability: structured logging, lifecycle events and metrics
//!
//! # Principles
//!
//! 1. Observability is read-only and never changes query results
//! 2. Logging is synchronous, one JSON object per line
//! 3. Output is deterministic apart from ids and timings
//!
//! # Usage
//!
//! ```ignore
//! use stagedb::observability::{Event, Logger, Severity};
//!
//! let logger = Logger::new(Severity::Info).for_query("3f2c...");
//! logger.info(Event::SelectPlanned.as_str(), &[("stage", "Complete")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};
