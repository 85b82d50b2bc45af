//! LIMIT / OFFSET

use crate::block::Block;
use crate::error::QueryResult;

use super::{BlockStream, BoxedStream, PlanNode};

/// Skips `offset` rows, then passes `limit` rows. The input is not read
/// any further once the limit is reached.
pub struct LimitStream {
    input: BoxedStream,
    limit: usize,
    offset: usize,
    /// Rows read from the input so far
    position: usize,
    label: &'static str,
}

impl LimitStream {
    pub fn new(input: BoxedStream, limit: usize, offset: usize) -> Self {
        Self {
            input,
            limit,
            offset,
            position: 0,
            label: "Limit",
        }
    }

    /// Caps a single stream at `offset + limit` rows before a fan-in
    pub fn pre_limit(input: BoxedStream, rows: usize) -> Self {
        Self {
            label: "PreLimit",
            ..Self::new(input, rows, 0)
        }
    }
}

impl BlockStream for LimitStream {
    fn header(&self) -> &Block {
        self.input.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        let end = self.offset.saturating_add(self.limit);
        while self.position < end {
            let Some(block) = self.input.read()? else {
                return Ok(None);
            };
            let start = self.position;
            self.position += block.rows();
            if self.position <= self.offset {
                continue;
            }
            if start >= self.offset && self.position <= end {
                return Ok(Some(block));
            }
            let skip = self.offset.saturating_sub(start);
            let take = end.min(self.position) - start.max(self.offset);
            return Ok(Some(block.slice(skip, take)));
        }
        Ok(None)
    }

    fn totals(&self) -> Option<Block> {
        self.input.totals()
    }

    fn explain(&self) -> PlanNode {
        let mut node = PlanNode::new(self.label).detail(format!("limit: {}", self.limit));
        if self.offset > 0 {
            node = node.detail(format!("offset: {}", self.offset));
        }
        node.child(self.input.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, DataType, Value};
    use crate::stream::{read_all, BlocksSource};

    fn source(blocks: &[std::ops::Range<u64>]) -> BoxedStream {
        let make = |r: &std::ops::Range<u64>| {
            Block::new(vec![Column::new("x", DataType::UInt64, r.clone().map(Value::UInt).collect())])
        };
        let blocks: Vec<Block> = blocks.iter().map(make).collect();
        Box::new(BlocksSource::new("t", make(&(0..0)), blocks))
    }

    fn values(stream: &mut LimitStream) -> Vec<Value> {
        read_all(stream)
            .unwrap()
            .iter()
            .flat_map(|b| b.column(0).values.clone())
            .collect()
    }

    #[test]
    fn test_offset_spanning_blocks() {
        let mut stream = LimitStream::new(source(&[0..4, 4..8, 8..12]), 5, 3);
        assert_eq!(values(&mut stream), (3..8u64).map(Value::UInt).collect::<Vec<_>>());
    }

    #[test]
    fn test_limit_inside_one_block() {
        let mut stream = LimitStream::new(source(&[0..10]), 2, 4);
        assert_eq!(values(&mut stream), vec![Value::UInt(4), Value::UInt(5)]);
    }

    #[test]
    fn test_pre_limit_has_no_offset() {
        let mut stream = LimitStream::pre_limit(source(&[0..3, 3..6]), 4);
        assert_eq!(values(&mut stream).len(), 4);
        assert_eq!(stream.explain().name, "PreLimit");
    }
}
