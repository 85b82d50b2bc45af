//! Query interpretation
//!
//! `SelectInterpreter` turns one SELECT (and its UNION ALL chain) into a
//! tree of block streams, stopping at the requested processing stage.

mod context;
mod pipeline;
mod select;
mod stage;

pub use context::{Context, DEFAULT_DATABASE};
pub use select::SelectInterpreter;
pub use stage::ProcessingStage;
