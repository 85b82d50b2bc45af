//! Row filtering for WHERE and HAVING

use crate::analysis::FilterActions;
use crate::block::Block;
use crate::error::{QueryError, QueryResult};

use super::{BlockStream, BoxedStream, PlanNode};

/// Evaluates the filter column and keeps rows where it is true. A filter
/// column computed only for filtering is removed again.
pub struct FilterStream {
    input: BoxedStream,
    filter: FilterActions,
    remove_column: bool,
    header: Block,
    label: &'static str,
}

impl FilterStream {
    pub fn new(input: BoxedStream, filter: FilterActions, label: &'static str) -> Self {
        let remove_column = !input.header().has(&filter.column);
        let mut header = filter.actions.header().clone();
        if remove_column {
            header.remove(&filter.column);
        }
        Self {
            input,
            filter,
            remove_column,
            header,
            label,
        }
    }
}

impl BlockStream for FilterStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        while let Some(block) = self.input.read()? {
            let mut block = self.filter.actions.execute(block)?;
            let mask: Vec<bool> = match block.by_name(&self.filter.column) {
                Some(column) => column.values.iter().map(|v| v.is_true()).collect(),
                None => {
                    return Err(QueryError::execution_failed(format!(
                        "Filter column {} missing from block",
                        self.filter.column
                    )))
                }
            };
            if self.remove_column {
                block.remove(&self.filter.column);
            }
            let filtered = if mask.iter().all(|keep| *keep) {
                block
            } else {
                block.filter(&mask)
            };
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
        PlanNode::new(self.label)
            .detail(self.filter.column.clone())
            .child(self.input.explain())
    }
}
