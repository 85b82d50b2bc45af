//! Pull-based block streams
//!
//! Every pipeline step is a `BlockStream` wrapping one or more input
//! streams. Nothing happens until the consumer calls `read`; dropping a
//! stream releases everything it holds, including worker threads and table
//! locks further down the chain.

mod aggregating;
mod aggregator;
mod creating_sets;
mod distinct;
mod explain;
mod expression;
mod filter;
mod limit;
mod merging_aggregated;
mod merging_sorted;
mod sorting;
mod source;
mod totals_having;
mod union;

pub use aggregating::AggregatingStream;
pub use aggregator::{finalize_block, AggregatedData, AggregationParams, Aggregator};
pub use creating_sets::CreatingSetsStream;
pub use distinct::DistinctStream;
pub use explain::{ExplainPlan, PlanNode};
pub use expression::ExpressionStream;
pub use filter::FilterStream;
pub use limit::LimitStream;
pub use merging_aggregated::MergingAggregatedStream;
pub use merging_sorted::MergingSortedStream;
pub use sorting::{compare_rows, SortingStream};
pub use source::BlocksSource;
pub use totals_having::TotalsHavingStream;
pub use union::UnionStream;

use crate::block::Block;
use crate::error::QueryResult;

/// A lazy sequence of blocks sharing one header
pub trait BlockStream: Send {
    /// Zero-row block with the schema of every block this stream yields
    fn header(&self) -> &Block;

    /// Next block, or `None` once the stream is exhausted
    fn read(&mut self) -> QueryResult<Option<Block>>;

    /// The WITH TOTALS row, available once the stream is exhausted
    fn totals(&self) -> Option<Block> {
        None
    }

    /// Description of this operator and its inputs
    fn explain(&self) -> PlanNode;
}

pub type BoxedStream = Box<dyn BlockStream>;

/// Reads every remaining block
pub fn read_all(stream: &mut dyn BlockStream) -> QueryResult<Vec<Block>> {
    let mut blocks = Vec::new();
    while let Some(block) = stream.read()? {
        blocks.push(block);
    }
    Ok(blocks)
}
