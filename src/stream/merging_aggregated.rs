//! Merge of partially aggregated blocks

use std::collections::VecDeque;

use crate::block::Block;
use crate::error::QueryResult;

use super::aggregator::Aggregator;
use super::{BlockStream, BoxedStream, PlanNode};

/// Combines partial states for the same key coming from several sources
/// (typically shards). Overflow blocks are merged into the overflow row.
pub struct MergingAggregatedStream {
    input: BoxedStream,
    aggregator: Aggregator,
    finalized: bool,
    header: Block,
    output: Option<VecDeque<Block>>,
}

impl MergingAggregatedStream {
    pub fn new(input: BoxedStream, aggregator: Aggregator, finalized: bool) -> Self {
        let header = aggregator.header(finalized);
        Self {
            input,
            aggregator,
            finalized,
            header,
            output: None,
        }
    }

    fn merge(&mut self) -> QueryResult<VecDeque<Block>> {
        let mut data = self.aggregator.new_data();
        while let Some(block) = self.input.read()? {
            self.aggregator.merge_block(&block, &mut data)?;
        }
        Ok(self.aggregator.convert_to_blocks(data, self.finalized).into())
    }
}

impl BlockStream for MergingAggregatedStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.output.is_none() {
            self.output = Some(self.merge()?);
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new("MergingAggregated")
            .detail(format!("final: {}", self.finalized))
            .child(self.input.explain())
    }
}
