//! Row blocks, values and data types
//!
//! Blocks are columnar: each column owns a vector of values of one type.
//! A zero-row block doubles as the schema (header) of a stream.

mod block;
mod types;
mod value;

pub use block::{Block, BlockInfo, Column};
pub use types::{ColumnDef, DataType};
pub use value::Value;
