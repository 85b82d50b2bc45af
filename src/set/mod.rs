//! Sets for IN / NOT IN and their materialization

mod materializer;
mod set;

pub use materializer::{PlannedSubquerySet, SetMaterializer, SubqueryForSet};
pub use set::{Set, SetBuilder};
