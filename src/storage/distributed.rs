//! Tables spread over several shards
//!
//! A distributed table has no data of its own. Reading it runs the query on
//! every shard, each with its own catalog, and returns one stream per shard.
//! When the caller wants more than raw columns, shards aggregate up to the
//! mergeable stage and the caller merges their partial states.

use std::sync::Arc;

use crate::block::ColumnDef;
use crate::error::QueryResult;
use crate::interpreter::{Context, ProcessingStage, SelectInterpreter};
use crate::query::{Expr, SelectQuery, TableExpr};

use super::catalog::Catalog;
use super::lock::TableLocks;
use super::{ScanResult, Storage};

/// Where one shard keeps its part of the table
#[derive(Clone)]
pub struct Shard {
    pub catalog: Arc<Catalog>,
    pub database: String,
    pub table: String,
}

pub struct DistributedTable {
    name: String,
    columns: Vec<ColumnDef>,
    shards: Vec<Shard>,
    locks: Arc<TableLocks>,
}

impl DistributedTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, shards: Vec<Shard>) -> Self {
        let name = name.into();
        Self {
            locks: TableLocks::new(name.clone()),
            name,
            columns,
            shards,
        }
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// The query a shard runs: the full query up to the mergeable stage, or
    /// a plain read of the required columns
    fn shard_query(
        &self,
        shard: &Shard,
        columns: &[String],
        query: &SelectQuery,
        stage: ProcessingStage,
    ) -> SelectQuery {
        let mut shard_query = match stage {
            ProcessingStage::FetchColumns => {
                columns.iter().fold(SelectQuery::new(), |q, c| q.select(Expr::col(c.clone())))
            }
            _ => {
                let mut q = query.clone();
                q.union_all = None;
                q
            }
        };
        shard_query.from = Some(TableExpr::Table {
            database: Some(shard.database.clone()),
            table: shard.table.clone(),
        });
        shard_query
    }
}

impl Storage for DistributedTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<ColumnDef> {
        self.columns.clone()
    }

    fn read(
        &self,
        columns: &[String],
        query: &SelectQuery,
        context: &Context,
        to_stage: ProcessingStage,
    ) -> QueryResult<ScanResult> {
        let stage = if to_stage >= ProcessingStage::WithMergeableState {
            ProcessingStage::WithMergeableState
        } else {
            ProcessingStage::FetchColumns
        };
        let query_stage = match stage {
            // a plain column read runs to completion on the shard
            ProcessingStage::FetchColumns => ProcessingStage::Complete,
            other => other,
        };

        let mut streams = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let shard_query = self.shard_query(shard, columns, query, stage);
            let shard_context = context.with_catalog(Arc::clone(&shard.catalog));
            let interpreter = SelectInterpreter::new(shard_query, &shard_context, query_stage)?;
            streams.push(interpreter.execute()?);
        }
        Ok(ScanResult { streams, stage })
    }

    fn structure(&self) -> &Arc<TableLocks> {
        &self.locks
    }
}
