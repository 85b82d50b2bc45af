//! In-memory tables

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::block::{Block, Column, ColumnDef, Value};
use crate::error::{QueryError, QueryResult};
use crate::interpreter::{Context, ProcessingStage};
use crate::query::SelectQuery;
use crate::stream::{BlocksSource, BoxedStream};

use super::lock::TableLocks;
use super::{ScanResult, Storage};

/// A table held in memory as a list of partitions. Each partition is read
/// by one stream; partitions are spread over at most `max_threads` streams.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    columns: RwLock<Vec<ColumnDef>>,
    partitions: RwLock<Vec<Block>>,
    locks: Arc<TableLocks>,
    scans: AtomicUsize,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        let name = name.into();
        Self {
            locks: TableLocks::new(name.clone()),
            name,
            columns: RwLock::new(columns),
            partitions: RwLock::new(Vec::new()),
            scans: AtomicUsize::new(0),
        }
    }

    /// Appends a partition from rows in column order, converting every
    /// value to its column type
    pub fn insert_partition(&self, rows: Vec<Vec<Value>>) -> QueryResult<()> {
        let header = Block::header(&self.columns());
        let mut converted = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != header.num_columns() {
                return Err(QueryError::execution_failed(format!(
                    "Row of {} values inserted into {} with {} columns",
                    row.len(),
                    self.name,
                    header.num_columns()
                )));
            }
            let values = row
                .into_iter()
                .zip(header.columns())
                .map(|(value, column)| column.data_type.coerce(value))
                .collect::<QueryResult<Vec<_>>>()?;
            converted.push(values);
        }
        self.insert_partition_block(Block::from_rows(&header, converted))
    }

    /// Appends a partition that already has the table structure
    pub fn insert_partition_block(&self, block: Block) -> QueryResult<()> {
        if !block.same_structure(&Block::header(&self.columns())) {
            return Err(QueryError::execution_failed(format!(
                "Block structure does not match table {}",
                self.name
            )));
        }
        self.partitions
            .write()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?
            .push(block);
        Ok(())
    }

    /// Adds a column filled with default values. Rejected while any query
    /// holds the table.
    pub fn add_column(&self, column: ColumnDef) -> QueryResult<()> {
        self.locks.alter(|| -> QueryResult<()> {
            let mut columns = self
                .columns
                .write()
                .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
            let mut partitions = self
                .partitions
                .write()
                .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
            for partition in partitions.iter_mut() {
                let values = vec![column.data_type.default_value(); partition.rows()];
                partition.insert(Column::new(column.name.clone(), column.data_type.clone(), values));
            }
            columns.push(column);
            Ok(())
        })?
    }

    /// Number of scans started so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    fn project(&self, partition: &Block, columns: &[String]) -> QueryResult<Block> {
        let mut projected = Vec::with_capacity(columns.len());
        for name in columns {
            let column = partition
                .by_name(name)
                .ok_or_else(|| QueryError::no_such_column(name))?;
            projected.push(column.clone());
        }
        Ok(Block::new(projected))
    }
}

impl Storage for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<ColumnDef> {
        self.columns.read().map(|c| c.clone()).unwrap_or_default()
    }

    fn read(
        &self,
        columns: &[String],
        _query: &SelectQuery,
        context: &Context,
        _to_stage: ProcessingStage,
    ) -> QueryResult<ScanResult> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        context.metrics().increment_scans_started();

        let table_columns = self.columns();
        let mut defs = Vec::with_capacity(columns.len());
        for name in columns {
            let def = table_columns
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| QueryError::no_such_column(name))?;
            defs.push(def.clone());
        }
        let header = Block::header(&defs);

        let partitions = self
            .partitions
            .read()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        let settings = context.settings();
        let stream_count = partitions.len().clamp(1, settings.max_threads.max(1));
        let mut groups: Vec<Vec<Block>> = vec![Vec::new(); stream_count];
        for (i, partition) in partitions.iter().enumerate() {
            let projected = self.project(partition, columns)?;
            let block_size = settings.max_block_size.max(1);
            let mut offset = 0;
            while offset < projected.rows() {
                groups[i % stream_count].push(projected.slice(offset, block_size));
                offset += block_size;
            }
        }

        let streams = groups
            .into_iter()
            .map(|blocks| {
                Box::new(BlocksSource::new(self.name.clone(), header.clone(), blocks)) as BoxedStream
            })
            .collect();
        Ok(ScanResult {
            streams,
            stage: ProcessingStage::FetchColumns,
        })
    }

    fn structure(&self) -> &Arc<TableLocks> {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DataType;
    use crate::config::Settings;
    use crate::error::QueryErrorCode;
    use crate::storage::Catalog;
    use crate::stream::read_all;

    fn table() -> MemoryTable {
        let table = MemoryTable::new(
            "t",
            vec![
                ColumnDef::new("a", DataType::UInt64),
                ColumnDef::new("b", DataType::String),
            ],
        );
        table
            .insert_partition(vec![vec![1u64.into(), "x".into()], vec![2u64.into(), "y".into()]])
            .unwrap();
        table
            .insert_partition(vec![vec![3u64.into(), "z".into()]])
            .unwrap();
        table
    }

    fn context(max_threads: usize, max_block_size: usize) -> Context {
        let settings = Settings {
            max_threads,
            max_block_size,
            ..Settings::default()
        };
        Context::new(settings, Arc::new(Catalog::new()))
    }

    #[test]
    fn test_one_stream_per_partition() {
        let table = table();
        let ctx = context(8, 1);
        let mut scan = table
            .read(&["b".to_string()], &SelectQuery::new(), &ctx, ProcessingStage::Complete)
            .unwrap();
        assert_eq!(scan.stage, ProcessingStage::FetchColumns);
        assert_eq!(scan.streams.len(), 2);
        let blocks = read_all(scan.streams[0].as_mut()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].names(), vec!["b"]);
        assert_eq!(table.scan_count(), 1);
        assert_eq!(ctx.metrics().snapshot().scans_started, 1);
    }

    #[test]
    fn test_streams_capped_by_max_threads() {
        let table = table();
        let scan = table
            .read(&["a".to_string()], &SelectQuery::new(), &context(1, 1024), ProcessingStage::Complete)
            .unwrap();
        assert_eq!(scan.streams.len(), 1);
    }

    #[test]
    fn test_empty_table_yields_one_empty_stream() {
        let table = MemoryTable::new("e", vec![ColumnDef::new("a", DataType::UInt64)]);
        let mut scan = table
            .read(&["a".to_string()], &SelectQuery::new(), &context(4, 16), ProcessingStage::Complete)
            .unwrap();
        assert_eq!(scan.streams.len(), 1);
        assert!(read_all(scan.streams[0].as_mut()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_converts_values() {
        let table = MemoryTable::new("n", vec![ColumnDef::new("v", DataType::Float64)]);
        table.insert_partition(vec![vec![Value::UInt(2)]]).unwrap();
        let err = table
            .insert_partition(vec![vec![Value::from("x")]])
            .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::IllegalTypeOfArgument);
    }

    #[test]
    fn test_add_column_waits_for_readers() {
        let table = table();
        let lock = table.lock_structure().unwrap();
        let err = table
            .add_column(ColumnDef::new("c", DataType::Int64))
            .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TableStructureLocked);
        drop(lock);
        table.add_column(ColumnDef::new("c", DataType::Int64)).unwrap();
        assert_eq!(table.columns().len(), 3);
    }
}
