//! ORDER BY within one stream

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::analysis::SortColumn;
use crate::block::{Block, Value};
use crate::error::{QueryError, QueryResult};
use crate::query::SortDirection;

use super::{BlockStream, BoxedStream, PlanNode};

/// Compares two rows on the sort key positions, honoring each direction
pub fn compare_rows(a: &[Value], b: &[Value], positions: &[(usize, SortDirection)]) -> Ordering {
    for &(position, direction) in positions {
        let ordering = match direction {
            SortDirection::Asc => a[position].cmp(&b[position]),
            SortDirection::Desc => b[position].cmp(&a[position]),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Resolves sort columns against a header
pub(crate) fn sort_positions(
    header: &Block,
    description: &[SortColumn],
) -> QueryResult<Vec<(usize, SortDirection)>> {
    description
        .iter()
        .map(|column| {
            header
                .position(&column.name)
                .map(|p| (p, column.direction))
                .ok_or_else(|| {
                    QueryError::execution_failed(format!(
                        "Sort column {} missing from block",
                        column.name
                    ))
                })
        })
        .collect()
}

pub(crate) fn describe_sort(description: &[SortColumn]) -> String {
    description
        .iter()
        .map(|c| format!("{} {}", c.name, c.direction.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads the whole input, sorts it stably and re-emits it in blocks of at
/// most `max_block_size` rows. With a limit only the first `limit` rows are
/// kept.
pub struct SortingStream {
    input: BoxedStream,
    description: Vec<SortColumn>,
    /// Rows to keep; 0 means all
    limit: usize,
    max_block_size: usize,
    output: Option<VecDeque<Block>>,
}

impl SortingStream {
    pub fn new(
        input: BoxedStream,
        description: Vec<SortColumn>,
        limit: usize,
        max_block_size: usize,
    ) -> Self {
        Self {
            input,
            description,
            limit,
            max_block_size: max_block_size.max(1),
            output: None,
        }
    }

    fn sort(&mut self) -> QueryResult<VecDeque<Block>> {
        let header = self.input.header().clone_empty();
        let positions = sort_positions(&header, &self.description)?;

        let mut rows = Vec::new();
        while let Some(block) = self.input.read()? {
            rows.extend(block.to_rows());
        }
        rows.sort_by(|a, b| compare_rows(a, b, &positions));
        if self.limit > 0 {
            rows.truncate(self.limit);
        }

        let mut blocks = VecDeque::new();
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Vec<Value>> = rows.by_ref().take(self.max_block_size).collect();
            blocks.push_back(Block::from_rows(&header, chunk));
        }
        Ok(blocks)
    }
}

impl BlockStream for SortingStream {
    fn header(&self) -> &Block {
        self.input.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.output.is_none() {
            self.output = Some(self.sort()?);
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn totals(&self) -> Option<Block> {
        self.input.totals()
    }

    fn explain(&self) -> PlanNode {
        let mut node = PlanNode::new("Sorting").detail(describe_sort(&self.description));
        if self.limit > 0 {
            node = node.detail(format!("limit: {}", self.limit));
        }
        node.child(self.input.explain())
    }
}
