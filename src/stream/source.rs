//! Leaf stream over materialized blocks

use std::collections::VecDeque;

use crate::block::Block;
use crate::error::QueryResult;

use super::{BlockStream, PlanNode};

/// Yields a fixed list of blocks. With no blocks it is an empty source
/// that only carries a header.
pub struct BlocksSource {
    label: String,
    header: Block,
    blocks: VecDeque<Block>,
}

impl BlocksSource {
    pub fn new(label: impl Into<String>, header: Block, blocks: Vec<Block>) -> Self {
        Self {
            label: label.into(),
            header,
            blocks: blocks.into(),
        }
    }

    pub fn empty(header: Block) -> Self {
        Self::new("Empty", header, Vec::new())
    }
}

impl BlockStream for BlocksSource {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        Ok(self.blocks.pop_front())
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new("Source").detail(self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, DataType};
    use crate::stream::read_all;

    #[test]
    fn test_yields_blocks_in_order() {
        let block = |v: u64| Block::new(vec![Column::new("x", DataType::UInt64, vec![v.into()])]);
        let mut source = BlocksSource::new("t", block(0).clone_empty(), vec![block(1), block(2)]);
        let blocks = read_all(&mut source).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].row(0)[0], crate::block::Value::UInt(2));
        assert!(source.read().unwrap().is_none());
    }
}
