//! Expression analysis
//!
//! Scalar and aggregate functions, compiled expression actions, and the
//! analyzer that turns a query level into the action chains of the pipeline.

mod actions;
mod aggregates;
mod analyzer;
mod functions;

pub use actions::{compile, literal_type, CompiledExpr, ExpressionActions};
pub use aggregates::{AggregateDescription, AggregateFunction, AggregateState};
pub use analyzer::{ExpressionAnalyzer, FilterActions, SortColumn};
pub use functions::ScalarFunction;
