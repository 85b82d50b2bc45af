//! Applies expression actions to every block

use std::sync::Arc;

use crate::analysis::ExpressionActions;
use crate::block::Block;
use crate::error::QueryResult;

use super::{BlockStream, BoxedStream, PlanNode};

/// Computes columns (or projects) block by block. The totals row goes
/// through the same actions.
pub struct ExpressionStream {
    input: BoxedStream,
    actions: Arc<ExpressionActions>,
    label: &'static str,
}

impl ExpressionStream {
    pub fn new(input: BoxedStream, actions: Arc<ExpressionActions>) -> Self {
        Self::with_label(input, actions, "Expression")
    }

    pub fn with_label(input: BoxedStream, actions: Arc<ExpressionActions>, label: &'static str) -> Self {
        Self {
            input,
            actions,
            label,
        }
    }
}

impl BlockStream for ExpressionStream {
    fn header(&self) -> &Block {
        self.actions.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        match self.input.read()? {
            Some(block) => Ok(Some(self.actions.execute(block)?)),
            None => Ok(None),
        }
    }

    fn totals(&self) -> Option<Block> {
        // a totals row that fails to evaluate is dropped rather than
        // failing an already finished stream
        self.input
            .totals()
            .and_then(|totals| self.actions.execute(totals).ok())
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new(self.label)
            .detail(self.actions.describe())
            .child(self.input.explain())
    }
}
