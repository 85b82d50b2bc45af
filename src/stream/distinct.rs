//! DISTINCT

use std::collections::HashSet;

use crate::block::{Block, Value};
use crate::config::OverflowMode;
use crate::error::{QueryError, QueryResult};

use super::{BlockStream, BoxedStream, PlanNode};

/// Passes the first occurrence of every distinct key. The key is the listed
/// columns, or the whole row when none are listed.
pub struct DistinctStream {
    input: BoxedStream,
    columns: Vec<String>,
    /// Stop after this many distinct rows; 0 means no limit
    limit_hint: usize,
    max_rows: usize,
    overflow_mode: OverflowMode,
    seen: HashSet<Vec<Value>>,
    finished: bool,
}

impl DistinctStream {
    pub fn new(
        input: BoxedStream,
        columns: Vec<String>,
        limit_hint: usize,
        max_rows: usize,
        overflow_mode: OverflowMode,
    ) -> Self {
        Self {
            input,
            columns,
            limit_hint,
            max_rows,
            overflow_mode,
            seen: HashSet::new(),
            finished: false,
        }
    }

    fn key_positions(&self, block: &Block) -> QueryResult<Vec<usize>> {
        if self.columns.is_empty() {
            return Ok((0..block.num_columns()).collect());
        }
        self.columns
            .iter()
            .map(|name| {
                block.position(name).ok_or_else(|| {
                    QueryError::execution_failed(format!("Distinct column {} missing from block", name))
                })
            })
            .collect()
    }

    fn limit_reached(&self) -> bool {
        self.limit_hint > 0 && self.seen.len() >= self.limit_hint
    }
}

impl BlockStream for DistinctStream {
    fn header(&self) -> &Block {
        self.input.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        while !self.finished {
            if self.limit_reached() {
                self.finished = true;
                break;
            }
            let block = match self.input.read()? {
                Some(block) => block,
                None => {
                    self.finished = true;
                    break;
                }
            };
            let positions = self.key_positions(&block)?;
            let mut mask = vec![false; block.rows()];
            for (row, keep) in mask.iter_mut().enumerate() {
                if self.limit_reached() {
                    break;
                }
                let key = block.key(&positions, row);
                if self.seen.contains(&key) {
                    continue;
                }
                if self.max_rows > 0 && self.seen.len() >= self.max_rows {
                    match self.overflow_mode {
                        OverflowMode::Break => {
                            self.finished = true;
                            break;
                        }
                        OverflowMode::Throw | OverflowMode::Any => {
                            return Err(QueryError::too_many_rows_in_distinct(self.max_rows))
                        }
                    }
                }
                self.seen.insert(key);
                *keep = true;
            }
            let filtered = block.filter(&mask);
            if !filtered.is_empty() {
                return Ok(Some(filtered));
            }
        }
        Ok(None)
    }

    fn totals(&self) -> Option<Block> {
        self.input.totals()
    }

    fn explain(&self) -> PlanNode {
        let mut node = PlanNode::new("Distinct");
        if !self.columns.is_empty() {
            node = node.detail(format!("columns: [{}]", self.columns.join(", ")));
        }
        if self.limit_hint > 0 {
            node = node.detail(format!("limit: {}", self.limit_hint));
        }
        node.child(self.input.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, DataType};
    use crate::error::QueryErrorCode;
    use crate::stream::{read_all, BlocksSource};

    fn source(pairs: &[(u64, &str)]) -> BoxedStream {
        let block = Block::new(vec![
            Column::new("a", DataType::UInt64, pairs.iter().map(|p| Value::UInt(p.0)).collect()),
            Column::new("b", DataType::String, pairs.iter().map(|p| Value::from(p.1)).collect()),
        ]);
        Box::new(BlocksSource::new("t", block.clone_empty(), vec![block]))
    }

    fn rows(stream: &mut DistinctStream) -> Vec<Vec<Value>> {
        read_all(stream).unwrap().iter().flat_map(|b| b.to_rows()).collect()
    }

    #[test]
    fn test_whole_row_key() {
        let mut stream = DistinctStream::new(
            source(&[(1, "x"), (1, "x"), (1, "y")]),
            Vec::new(),
            0,
            0,
            OverflowMode::Throw,
        );
        assert_eq!(rows(&mut stream).len(), 2);
    }

    #[test]
    fn test_key_subset_keeps_first_occurrence() {
        let mut stream = DistinctStream::new(
            source(&[(1, "x"), (2, "y"), (1, "z")]),
            vec!["a".into()],
            0,
            0,
            OverflowMode::Throw,
        );
        assert_eq!(
            rows(&mut stream),
            vec![
                vec![Value::UInt(1), Value::from("x")],
                vec![Value::UInt(2), Value::from("y")],
            ]
        );
    }

    #[test]
    fn test_limit_hint_stops_early() {
        let mut stream = DistinctStream::new(
            source(&[(1, "x"), (2, "x"), (3, "x")]),
            vec!["a".into()],
            2,
            0,
            OverflowMode::Throw,
        );
        assert_eq!(rows(&mut stream).len(), 2);
    }

    #[test]
    fn test_max_rows_throw_and_break() {
        let mut throwing = DistinctStream::new(
            source(&[(1, "x"), (2, "x"), (3, "x")]),
            Vec::new(),
            0,
            2,
            OverflowMode::Throw,
        );
        let err = read_all(&mut throwing).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TooManyRowsInDistinct);

        let mut breaking = DistinctStream::new(
            source(&[(1, "x"), (2, "x"), (3, "x")]),
            Vec::new(),
            0,
            2,
            OverflowMode::Break,
        );
        assert_eq!(rows(&mut breaking).len(), 2);
    }
}
