//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use stagedb::block::{Block, ColumnDef, DataType, Value};
use stagedb::config::Settings;
use stagedb::interpreter::{Context, ProcessingStage, SelectInterpreter};
use stagedb::query::SelectQuery;
use stagedb::storage::{Catalog, MemoryTable, Storage};
use stagedb::stream::{read_all, BoxedStream};

/// Creates a table and attaches it to the default database
pub fn attach(catalog: &Catalog, name: &str, columns: Vec<ColumnDef>, partitions: Vec<Vec<Vec<Value>>>) -> Arc<MemoryTable> {
    let table = Arc::new(MemoryTable::new(name, columns));
    for partition in partitions {
        table.insert_partition(partition).unwrap();
    }
    catalog
        .attach("default", Arc::clone(&table) as Arc<dyn Storage>)
        .unwrap();
    table
}

/// `x UInt64` with the values `0..n` spread over `parts` partitions,
/// each partition in descending order
pub fn numbers_table(catalog: &Catalog, name: &str, n: u64, parts: u64) -> Arc<MemoryTable> {
    let partitions = (0..parts)
        .map(|p| {
            (0..n)
                .rev()
                .filter(|x| x % parts == p)
                .map(|x| vec![Value::UInt(x)])
                .collect()
        })
        .collect();
    attach(catalog, name, vec![ColumnDef::new("x", DataType::UInt64)], partitions)
}

pub fn context(catalog: Catalog) -> Context {
    Context::new(Settings::default(), Arc::new(catalog))
}

pub fn context_with(catalog: Catalog, settings: Settings) -> Context {
    Context::new(settings, Arc::new(catalog))
}

/// Rows of every block, in output order
pub fn rows_of(blocks: &[Block]) -> Vec<Vec<Value>> {
    blocks.iter().flat_map(Block::to_rows).collect()
}

/// Runs a query to completion, returning its rows and totals row
pub fn run(query: SelectQuery, context: &Context) -> (Vec<Vec<Value>>, Option<Vec<Value>>) {
    let mut stream = execute(query, context, ProcessingStage::Complete);
    let blocks = read_all(stream.as_mut()).unwrap();
    let totals = stream.totals().map(|t| t.row(0));
    (rows_of(&blocks), totals)
}

pub fn execute(query: SelectQuery, context: &Context, stage: ProcessingStage) -> BoxedStream {
    SelectInterpreter::new(query, context, stage)
        .unwrap()
        .execute()
        .unwrap()
}

pub fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort();
    rows
}

pub fn uints(values: &[u64]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![Value::UInt(*v)]).collect()
}
