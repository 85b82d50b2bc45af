//! Table storage as seen by the SELECT pipeline
//!
//! A storage exposes its columns, a structure lock and a scan. The scan
//! returns several independent streams so that the pipeline can process
//! them in parallel, together with the processing stage the streams have
//! already reached. Plain tables return raw columns; a distributed table
//! may return partially aggregated data from its shards.

mod catalog;
mod distributed;
mod lock;
mod memory;
mod numbers;

pub use catalog::Catalog;
pub use distributed::{DistributedTable, Shard};
pub use lock::{TableLocks, TableStructureReadLock};
pub use memory::MemoryTable;
pub use numbers::NumbersTable;

use std::sync::Arc;

use crate::block::ColumnDef;
use crate::error::QueryResult;
use crate::interpreter::{Context, ProcessingStage};
use crate::query::SelectQuery;
use crate::stream::BoxedStream;

/// Streams produced by a scan and the stage they have reached
pub struct ScanResult {
    pub streams: Vec<BoxedStream>,
    pub stage: ProcessingStage,
}

pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Declared columns, in table order
    fn columns(&self) -> Vec<ColumnDef>;

    /// Reads `columns` for `query`. Implementations may process the query up
    /// to `to_stage` themselves and report how far they got.
    fn read(
        &self,
        columns: &[String],
        query: &SelectQuery,
        context: &Context,
        to_stage: ProcessingStage,
    ) -> QueryResult<ScanResult>;

    fn structure(&self) -> &Arc<TableLocks>;

    /// Read lock on the table structure for the duration of a query
    fn lock_structure(&self) -> QueryResult<TableStructureReadLock> {
        self.structure().lock_for_read()
    }
}
