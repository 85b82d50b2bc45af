//! The `numbers(N)` table function

use std::sync::Arc;

use crate::block::{Block, Column, ColumnDef, DataType, Value};
use crate::error::{QueryError, QueryResult};
use crate::interpreter::{Context, ProcessingStage};
use crate::query::{Expr, SelectQuery};
use crate::stream::{BlockStream, PlanNode};

use super::lock::TableLocks;
use super::{ScanResult, Storage};

const COLUMN: &str = "number";

/// A single `number UInt64` column counting from 0 to N - 1
#[derive(Debug)]
pub struct NumbersTable {
    count: u64,
    locks: Arc<TableLocks>,
}

impl NumbersTable {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            locks: TableLocks::new("numbers"),
        }
    }

    /// Builds the table from the arguments of `numbers(...)`
    pub fn from_args(args: &[Expr]) -> QueryResult<Self> {
        match args {
            [Expr::Literal(Value::UInt(count))] => Ok(Self::new(*count)),
            [_] => Err(QueryError::invalid_table_function(
                "Argument of table function numbers must be a non-negative integer literal",
            )),
            _ => Err(QueryError::invalid_table_function(format!(
                "Table function numbers takes 1 argument, got {}",
                args.len()
            ))),
        }
    }
}

impl Storage for NumbersTable {
    fn name(&self) -> &str {
        "numbers"
    }

    fn columns(&self) -> Vec<ColumnDef> {
        vec![ColumnDef::new(COLUMN, DataType::UInt64)]
    }

    fn read(
        &self,
        columns: &[String],
        _query: &SelectQuery,
        context: &Context,
        _to_stage: ProcessingStage,
    ) -> QueryResult<ScanResult> {
        if let Some(unknown) = columns.iter().find(|c| c.as_str() != COLUMN) {
            return Err(QueryError::no_such_column(unknown));
        }
        context.metrics().increment_scans_started();
        let stream = NumbersSource {
            header: Block::header(&self.columns()),
            next: 0,
            end: self.count,
            block_size: context.settings().max_block_size.max(1) as u64,
        };
        Ok(ScanResult {
            streams: vec![Box::new(stream)],
            stage: ProcessingStage::FetchColumns,
        })
    }

    fn structure(&self) -> &Arc<TableLocks> {
        &self.locks
    }
}

/// Generates consecutive numbers block by block
struct NumbersSource {
    header: Block,
    next: u64,
    end: u64,
    block_size: u64,
}

impl BlockStream for NumbersSource {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let until = self.end.min(self.next.saturating_add(self.block_size));
        let values = (self.next..until).map(Value::UInt).collect();
        self.next = until;
        Ok(Some(Block::new(vec![Column::new(COLUMN, DataType::UInt64, values)])))
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new("Numbers").detail(format!("count: {}", self.end))
    }
}
