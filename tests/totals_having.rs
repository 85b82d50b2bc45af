//! WITH TOTALS and HAVING under every totals mode

mod common;

use common::*;
use stagedb::config::{OverflowMode, Settings, TotalsMode};
use stagedb::query::{Expr, SelectQuery, SortDirection};
use stagedb::storage::Catalog;

/// `SELECT x % 7 AS k, count() AS c FROM t WHERE x < 50 GROUP BY k WITH
/// TOTALS HAVING count() > 7`
fn grouped_query() -> SelectQuery {
    SelectQuery::new()
        .select_as(Expr::modulo(Expr::col("x"), Expr::lit(7u64)), "k")
        .select_as(Expr::count(), "c")
        .from_table("t")
        .filter(Expr::lt(Expr::col("x"), Expr::lit(50u64)))
        .group_by(Expr::col("k"))
        .with_totals()
        .having(Expr::gt(Expr::count(), Expr::lit(7u64)))
}

/// At most three keys; later keys go to the overflow row. With a single
/// descending partition the kept keys are 0, 6 and 5.
fn limited(mode: TotalsMode, threshold: f64) -> Settings {
    Settings {
        max_rows_to_group_by: 3,
        group_by_overflow_mode: OverflowMode::Any,
        totals_mode: mode,
        totals_auto_threshold: threshold,
        ..Settings::default()
    }
}

fn run_single_partition(settings: Settings) -> (Vec<Vec<stagedb::block::Value>>, Option<Vec<stagedb::block::Value>>) {
    let catalog = Catalog::new();
    numbers_table(&catalog, "t", 100, 1);
    run(grouped_query(), &context_with(catalog, settings))
}

// =============================================================================
// TOTALS WITHOUT OVERFLOW
// =============================================================================

/// Before HAVING, the totals count every row that passed WHERE.
#[test]
fn test_totals_before_having_counts_filtered_rows() {
    let catalog = Catalog::new();
    numbers_table(&catalog, "t", 100, 4);
    let (rows, totals) = run(grouped_query(), &context(catalog));

    // k = 0 occurs 8 times below 50, every other key 7 times
    assert_eq!(rows, vec![vec![0u64.into(), 8u64.into()]]);
    assert_eq!(totals.unwrap(), vec![0u64.into(), 50u64.into()]);
}

/// After HAVING (exclusive), the totals only cover passing groups.
#[test]
fn test_totals_after_having_exclusive() {
    let catalog = Catalog::new();
    numbers_table(&catalog, "t", 100, 4);
    let settings = Settings {
        totals_mode: TotalsMode::AfterHavingExclusive,
        ..Settings::default()
    };
    let (_, totals) = run(grouped_query(), &context_with(catalog, settings));
    assert_eq!(totals.unwrap(), vec![0u64.into(), 8u64.into()]);
}

/// Totals survive sorting and LIMIT.
#[test]
fn test_totals_with_order_and_limit() {
    let catalog = Catalog::new();
    numbers_table(&catalog, "t", 20, 3);
    let query = SelectQuery::new()
        .select_as(Expr::modulo(Expr::col("x"), Expr::lit(2u64)), "k")
        .select_as(Expr::count(), "c")
        .from_table("t")
        .group_by(Expr::col("k"))
        .with_totals()
        .order_by(Expr::col("k"), SortDirection::Desc)
        .limit(1);

    let (rows, totals) = run(query, &context(catalog));
    assert_eq!(rows, vec![vec![1u64.into(), 10u64.into()]]);
    assert_eq!(totals.unwrap(), vec![0u64.into(), 20u64.into()]);
}

// =============================================================================
// TOTALS WITH OVERFLOW ROW
// =============================================================================

/// Before HAVING, overflowed rows still count towards the totals.
#[test]
fn test_overflow_before_having() {
    let (rows, totals) = run_single_partition(limited(TotalsMode::BeforeHaving, 0.5));
    assert_eq!(rows, vec![vec![0u64.into(), 8u64.into()]]);
    assert_eq!(totals.unwrap(), vec![0u64.into(), 50u64.into()]);
}

/// Inclusive: passing groups plus the overflow row (8 + 28).
#[test]
fn test_overflow_after_having_inclusive() {
    let (rows, totals) = run_single_partition(limited(TotalsMode::AfterHavingInclusive, 0.5));
    assert_eq!(rows, vec![vec![0u64.into(), 8u64.into()]]);
    assert_eq!(totals.unwrap(), vec![0u64.into(), 36u64.into()]);
}

/// Exclusive: no overflow row at all, and keys past the limit are dropped.
#[test]
fn test_overflow_after_having_exclusive() {
    let (rows, totals) = run_single_partition(limited(TotalsMode::AfterHavingExclusive, 0.5));
    assert_eq!(rows, vec![vec![0u64.into(), 8u64.into()]]);
    assert_eq!(totals.unwrap(), vec![0u64.into(), 8u64.into()]);
}

/// Auto: one of three groups passes, so the overflow row is included only
/// when the threshold is at most one third.
#[test]
fn test_overflow_after_having_auto() {
    let (_, totals) = run_single_partition(limited(TotalsMode::AfterHavingAuto, 0.5));
    assert_eq!(totals.unwrap(), vec![0u64.into(), 8u64.into()]);

    let (_, totals) = run_single_partition(limited(TotalsMode::AfterHavingAuto, 0.3));
    assert_eq!(totals.unwrap(), vec![0u64.into(), 36u64.into()]);
}
