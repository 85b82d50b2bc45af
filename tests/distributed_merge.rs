//! Shards processed to the mergeable stage and finished by the caller

mod common;

use std::sync::Arc;

use common::*;
use stagedb::analysis::AggregateFunction;
use stagedb::block::{ColumnDef, DataType, Value};
use stagedb::interpreter::ProcessingStage;
use stagedb::query::{Expr, SelectQuery, SortDirection};
use stagedb::storage::{Catalog, DistributedTable, Shard};
use stagedb::stream::read_all;

const SHARDS: u64 = 3;
const ROWS: u64 = 300;

fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("x", DataType::UInt64),
        ColumnDef::new("s", DataType::String),
    ]
}

fn row(x: u64) -> Vec<Value> {
    vec![Value::UInt(x), Value::from(format!("s{}", x % 5))]
}

/// A catalog holding the whole data set as `all` and a distributed table
/// `dist` over shards that each hold every third row
fn cluster() -> Catalog {
    let coordinator = Catalog::new();
    attach(
        &coordinator,
        "all",
        columns(),
        vec![(0..ROWS).map(row).collect()],
    );

    let shards = (0..SHARDS)
        .map(|i| {
            let catalog = Catalog::new();
            // two partitions per shard
            let rows: Vec<u64> = (0..ROWS).filter(|x| x % SHARDS == i).collect();
            let (first, second) = rows.split_at(rows.len() / 2);
            attach(
                &catalog,
                "data",
                columns(),
                vec![
                    first.iter().copied().map(row).collect(),
                    second.iter().copied().map(row).collect(),
                ],
            );
            Shard {
                catalog: Arc::new(catalog),
                database: "default".into(),
                table: "data".into(),
            }
        })
        .collect();
    coordinator
        .attach("default", Arc::new(DistributedTable::new("dist", columns(), shards)))
        .unwrap();
    coordinator
}

fn aggregate_query(table: &str) -> SelectQuery {
    SelectQuery::new()
        .select(Expr::col("s"))
        .select_as(Expr::count(), "c")
        .select_as(Expr::agg(AggregateFunction::Sum, Expr::col("x")), "total")
        .select_as(Expr::agg(AggregateFunction::Avg, Expr::col("x")), "mean")
        .select_as(Expr::agg(AggregateFunction::Uniq, Expr::col("x")), "distinct_x")
        .select_as(Expr::agg(AggregateFunction::Max, Expr::col("x")), "top")
        .from_table(table)
        .group_by(Expr::col("s"))
        .order_by(Expr::col("s"), SortDirection::Asc)
}

// =============================================================================
// MERGEABLE STATE
// =============================================================================

/// Shards aggregated to the mergeable stage and merged equal one complete
/// run over the combined data.
#[test]
fn test_sharded_aggregation_matches_single_run() {
    let context = context(cluster());
    let (distributed, _) = run(aggregate_query("dist"), &context);
    let (single, _) = run(aggregate_query("all"), &context);
    assert_eq!(distributed.len(), 5);
    assert_eq!(distributed, single);
}

/// A shard stopped at the mergeable stage returns partial states.
#[test]
fn test_mergeable_stage_returns_states() {
    let context = context(cluster());
    let mut stream = execute(aggregate_query("all"), &context, ProcessingStage::WithMergeableState);
    let header = stream.header().clone();
    assert!(header.types().iter().any(DataType::is_aggregate_state));
    let blocks = read_all(stream.as_mut()).unwrap();
    assert_eq!(blocks.iter().map(|b| b.rows()).sum::<usize>(), 5);
}

/// Explain shows the merge of shard states rather than a fresh aggregation.
#[test]
fn test_distributed_plan_merges_states() {
    let context = context(cluster());
    let stream = execute(aggregate_query("dist"), &context, ProcessingStage::Complete);
    let plan = stream.explain();
    let merge = plan.find("MergingAggregated").unwrap();
    assert_eq!(merge.count("Aggregating"), SHARDS as usize);
}

// =============================================================================
// NON-AGGREGATING QUERIES
// =============================================================================

/// Sorting with LIMIT and OFFSET is global across shards.
#[test]
fn test_sharded_order_limit_offset() {
    let context = context(cluster());
    let query = SelectQuery::new()
        .select(Expr::col("x"))
        .from_table("dist")
        .filter(Expr::eq(Expr::col("s"), Expr::lit("s1")))
        .order_by(Expr::col("x"), SortDirection::Asc)
        .limit(4)
        .offset(2);

    let (rows, _) = run(query, &context);
    assert_eq!(rows, uints(&[11, 16, 21, 26]));
}

/// An IN set is built once on the coordinator and shared with the shards.
#[test]
fn test_sharded_in_subquery() {
    let catalog = cluster();
    let keys = attach(
        &catalog,
        "keys",
        vec![ColumnDef::new("k", DataType::UInt64)],
        vec![uints(&[3, 4, 5, 299, 1000])],
    );
    let context = context(catalog);
    let query = SelectQuery::new()
        .select(Expr::col("x"))
        .from_table("dist")
        .filter(Expr::in_subquery(
            Expr::col("x"),
            SelectQuery::new().select(Expr::col("k")).from_table("keys"),
        ));

    let (rows, _) = run(query, &context);
    assert_eq!(sorted(rows), uints(&[3, 4, 5, 299]));
    assert_eq!(keys.scan_count(), 1);
}
