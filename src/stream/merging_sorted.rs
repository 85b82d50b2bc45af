//! k-way merge of sorted streams

use std::cmp::Ordering;

use crate::analysis::SortColumn;
use crate::block::{Block, Value};
use crate::error::QueryResult;
use crate::query::SortDirection;

use super::sorting::{compare_rows, describe_sort, sort_positions};
use super::{BlockStream, BoxedStream, PlanNode};

/// Read position inside one input
struct Cursor {
    rows: Vec<Vec<Value>>,
    next: usize,
}

/// Merges inputs that are each sorted by the same description into one
/// sorted stream. Rows comparing equal are taken from the lowest-numbered
/// input first.
pub struct MergingSortedStream {
    inputs: Vec<BoxedStream>,
    cursors: Vec<Option<Cursor>>,
    description: Vec<SortColumn>,
    positions: Vec<(usize, SortDirection)>,
    header: Block,
    max_block_size: usize,
    /// Rows to emit; 0 means all
    limit: usize,
    emitted: usize,
    started: bool,
}

impl MergingSortedStream {
    pub fn new(
        inputs: Vec<BoxedStream>,
        description: Vec<SortColumn>,
        max_block_size: usize,
        limit: usize,
    ) -> QueryResult<Self> {
        let header = inputs
            .first()
            .map(|input| input.header().clone_empty())
            .unwrap_or_default();
        let positions = sort_positions(&header, &description)?;
        Ok(Self {
            cursors: inputs.iter().map(|_| None).collect(),
            inputs,
            description,
            positions,
            header,
            max_block_size: max_block_size.max(1),
            limit,
            emitted: 0,
            started: false,
        })
    }

    /// Loads the next non-empty block of input `i`, if any
    fn advance(&mut self, i: usize) -> QueryResult<()> {
        self.cursors[i] = None;
        while let Some(block) = self.inputs[i].read()? {
            if !block.is_empty() {
                self.cursors[i] = Some(Cursor {
                    rows: block.to_rows(),
                    next: 0,
                });
                break;
            }
        }
        Ok(())
    }

    /// Input holding the smallest current row
    fn smallest(&self) -> Option<usize> {
        let mut best: Option<(usize, &Vec<Value>)> = None;
        for (i, cursor) in self.cursors.iter().enumerate() {
            let Some(cursor) = cursor else { continue };
            let row = &cursor.rows[cursor.next];
            match best {
                Some((_, current)) if compare_rows(row, current, &self.positions) != Ordering::Less => {}
                _ => best = Some((i, row)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl BlockStream for MergingSortedStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if !self.started {
            self.started = true;
            for i in 0..self.inputs.len() {
                self.advance(i)?;
            }
        }

        let mut rows = Vec::new();
        while rows.len() < self.max_block_size {
            if self.limit > 0 && self.emitted >= self.limit {
                break;
            }
            let Some(i) = self.smallest() else { break };
            let exhausted = match self.cursors[i].as_mut() {
                Some(cursor) => {
                    rows.push(std::mem::take(&mut cursor.rows[cursor.next]));
                    cursor.next += 1;
                    cursor.next == cursor.rows.len()
                }
                None => true,
            };
            self.emitted += 1;
            if exhausted {
                self.advance(i)?;
            }
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Block::from_rows(&self.header, rows)))
        }
    }

    fn totals(&self) -> Option<Block> {
        self.inputs.first().and_then(|input| input.totals())
    }

    fn explain(&self) -> PlanNode {
        let mut node = PlanNode::new("MergingSorted").detail(describe_sort(&self.description));
        if self.limit > 0 {
            node = node.detail(format!("limit: {}", self.limit));
        }
        node.children(self.inputs.iter().map(|input| input.explain()))
    }
}
