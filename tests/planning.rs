//! Planning: output schema, column pruning and subquery limits

mod common;

use common::*;
use stagedb::analysis::AggregateFunction;
use stagedb::block::{Block, ColumnDef, DataType, Value};
use stagedb::config::Settings;
use stagedb::error::QueryErrorCode;
use stagedb::interpreter::{ProcessingStage, SelectInterpreter};
use stagedb::query::{Expr, SelectQuery, SortDirection};
use stagedb::storage::Catalog;
use stagedb::stream::read_all;

fn wide_catalog() -> Catalog {
    let catalog = Catalog::new();
    attach(
        &catalog,
        "wide",
        vec![
            ColumnDef::new("a", DataType::UInt64),
            ColumnDef::new("b", DataType::String),
            ColumnDef::new("c", DataType::String),
        ],
        vec![vec![
            vec![Value::UInt(1), "one".into(), "x".into()],
            vec![Value::UInt(2), "two".into(), "y".into()],
        ]],
    );
    numbers_table(&catalog, "t", 20, 3);
    catalog
}

fn shapes() -> Vec<(SelectQuery, ProcessingStage)> {
    let plain = SelectQuery::new()
        .select(Expr::col("x"))
        .select_as(Expr::plus(Expr::col("x"), Expr::lit(-1i64)), "y")
        .from_table("t");
    let grouped = SelectQuery::new()
        .select_as(Expr::modulo(Expr::col("x"), Expr::lit(2u64)), "k")
        .select_as(Expr::agg(AggregateFunction::Avg, Expr::col("x")), "mean")
        .from_table("t")
        .group_by(Expr::col("k"));
    vec![
        (plain.clone(), ProcessingStage::Complete),
        (plain.clone(), ProcessingStage::FetchColumns),
        (plain.clone().distinct().order_by(Expr::col("y"), SortDirection::Desc), ProcessingStage::Complete),
        (grouped.clone(), ProcessingStage::Complete),
        (grouped.clone(), ProcessingStage::WithMergeableState),
        (grouped.with_totals(), ProcessingStage::Complete),
        (SelectQuery::new().select(Expr::Asterisk).from_table("wide"), ProcessingStage::Complete),
        (
            SelectQuery::new()
                .select_as(Expr::count(), "n")
                .from_function("numbers", vec![Expr::lit(5u64)]),
            ProcessingStage::Complete,
        ),
    ]
}

fn structure(block: &Block) -> Vec<(String, DataType)> {
    block.names().into_iter().zip(block.types()).collect()
}

// =============================================================================
// SAMPLE BLOCK
// =============================================================================

/// The sample block matches the structure of every produced block.
#[test]
fn test_sample_block_matches_output() {
    let context = context(wide_catalog());
    for (query, stage) in shapes() {
        let interpreter = SelectInterpreter::new(query.clone(), &context, stage).unwrap();
        let sample = structure(interpreter.sample_block());
        assert_eq!(interpreter.return_types(), interpreter.sample_block().types());

        let mut stream = interpreter.execute().unwrap();
        assert_eq!(structure(stream.header()), sample, "header of {:?}", query);
        let blocks = read_all(stream.as_mut()).unwrap();
        assert!(!blocks.is_empty(), "no output for {:?}", query);
        for block in &blocks {
            assert_eq!(structure(block), sample, "block of {:?}", query);
        }
    }
}

/// Planning the same query twice yields the same sample block.
#[test]
fn test_sample_block_is_stable() {
    let context = context(wide_catalog());
    for (query, stage) in shapes() {
        let first = SelectInterpreter::new(query.clone(), &context, stage).unwrap();
        let second = SelectInterpreter::new(query, &context, stage).unwrap();
        assert_eq!(first.sample_block(), second.sample_block());
    }
}

// =============================================================================
// COLUMN PRUNING
// =============================================================================

/// Only required columns are produced, and pruned items are never analyzed.
#[test]
fn test_required_columns_prune_select_list() {
    let context = context(wide_catalog());
    let query = SelectQuery::new()
        .select(Expr::col("a"))
        // would be rejected if analyzed: String + UInt64
        .select_as(Expr::plus(Expr::col("b"), Expr::lit(1u64)), "bad")
        .select(Expr::col("c"))
        .from_table("wide");

    let interpreter = SelectInterpreter::with_required_columns(
        query,
        &context,
        &["a".to_string()],
        ProcessingStage::Complete,
    )
    .unwrap();
    assert_eq!(interpreter.sample_block().names(), vec!["a"]);
    assert_eq!(interpreter.required_source_columns(), vec!["a"]);

    let mut stream = interpreter.execute().unwrap();
    let rows = rows_of(&read_all(stream.as_mut()).unwrap());
    assert_eq!(sorted(rows), uints(&[1, 2]));
}

/// Restricting the table columns is fine as long as nothing needs the rest.
#[test]
fn test_table_columns_subset() {
    let context = context(wide_catalog());
    let query = SelectQuery::new()
        .select(Expr::col("a"))
        .select(Expr::col("b"))
        .from_table("wide");

    let interpreter = SelectInterpreter::with_input(
        query,
        &context,
        &["a".to_string()],
        Some(vec![ColumnDef::new("a", DataType::UInt64)]),
        None,
        ProcessingStage::Complete,
    )
    .unwrap();
    assert_eq!(interpreter.sample_block().names(), vec!["a"]);
}

/// A required column the query does not produce is an error.
#[test]
fn test_missing_required_column() {
    let context = context(wide_catalog());
    let query = SelectQuery::new().select(Expr::col("a")).from_table("wide");
    let err = SelectInterpreter::with_required_columns(
        query,
        &context,
        &["zzz".to_string()],
        ProcessingStage::Complete,
    )
    .err()
    .unwrap();
    assert_eq!(err.code(), QueryErrorCode::NoSuchColumn);
}

/// A FROM subquery only computes what the outer level reads.
#[test]
fn test_subquery_reads_only_required_columns() {
    let context = context(wide_catalog());
    let inner = SelectQuery::new()
        .select(Expr::col("a"))
        .select_as(Expr::func("upper", vec![Expr::col("b")]), "loud")
        .from_table("wide");
    let query = SelectQuery::new().select(Expr::col("a")).from_subquery(inner);

    let stream = execute(query, &context, ProcessingStage::Complete);
    let plan = stream.explain();
    assert!(!plan.to_string().contains("upper"));
}

fn filtered_by_alias() -> SelectQuery {
    SelectQuery::new()
        .select_as(Expr::plus(Expr::col("a"), Expr::lit(1u64)), "z")
        .select(Expr::col("b"))
        .from_table("wide")
        .filter(Expr::gt(Expr::col("z"), Expr::lit(2u64)))
}

/// A pruned select item stays usable through its alias in WHERE.
#[test]
fn test_pruned_alias_still_filters() {
    let context = context(wide_catalog());
    let interpreter = SelectInterpreter::with_required_columns(
        filtered_by_alias(),
        &context,
        &["b".to_string()],
        ProcessingStage::Complete,
    )
    .unwrap();
    assert_eq!(interpreter.sample_block().names(), vec!["b"]);

    let mut stream = interpreter.execute().unwrap();
    let rows = rows_of(&read_all(stream.as_mut()).unwrap());
    assert_eq!(rows, vec![vec![Value::from("two")]]);
}

/// An outer query may skip a subquery column that the subquery filters on.
#[test]
fn test_subquery_alias_used_only_in_where() {
    let context = context(wide_catalog());
    let query = SelectQuery::new()
        .select(Expr::col("b"))
        .from_subquery(filtered_by_alias());

    let (rows, _) = run(query, &context);
    assert_eq!(rows, vec![vec![Value::from("two")]]);
}

// =============================================================================
// SUBQUERY DEPTH
// =============================================================================

fn nested(levels: usize) -> SelectQuery {
    let mut query = SelectQuery::new().select_as(Expr::lit(1u64), "v");
    for _ in 0..levels {
        query = SelectQuery::new().select(Expr::col("v")).from_subquery(query);
    }
    query
}

/// Nesting up to the limit is accepted, one more level is rejected.
#[test]
fn test_subquery_depth_limit() {
    let settings = Settings {
        max_subquery_depth: 3,
        ..Settings::default()
    };
    let context = context_with(Catalog::new(), settings);

    let (rows, _) = run(nested(3), &context);
    assert_eq!(rows, uints(&[1]));

    let err = SelectInterpreter::new(nested(4), &context, ProcessingStage::Complete)
        .err()
        .unwrap();
    assert_eq!(err.code(), QueryErrorCode::TooDeepSubqueries);
}

/// Rejections are counted in the metrics.
#[test]
fn test_rejection_metrics() {
    let context = context(wide_catalog());
    let query = SelectQuery::new().select(Expr::col("nope")).from_table("wide");
    assert!(SelectInterpreter::new(query, &context, ProcessingStage::Complete).is_err());
    let snapshot = context.metrics().snapshot();
    assert_eq!(snapshot.queries_rejected, 1);
    assert_eq!(snapshot.queries_planned, 0);
}
