//! Table structure locks held by interpreters and their streams

mod common;

use common::*;
use stagedb::block::{ColumnDef, DataType};
use stagedb::error::QueryErrorCode;
use stagedb::interpreter::{ProcessingStage, SelectInterpreter};
use stagedb::query::{Expr, SelectQuery};
use stagedb::storage::{Catalog, Storage};
use stagedb::stream::read_all;

fn query() -> SelectQuery {
    SelectQuery::new().select(Expr::col("x")).from_table("t")
}

// =============================================================================
// LOCK LIFETIME
// =============================================================================

/// The lock is held from construction until the returned stream is dropped.
#[test]
fn test_lock_held_by_interpreter_and_stream() {
    let catalog = Catalog::new();
    let table = numbers_table(&catalog, "t", 10, 2);
    let context = context(catalog);

    let interpreter = SelectInterpreter::new(query(), &context, ProcessingStage::Complete).unwrap();
    assert_eq!(table.structure().readers(), 1);
    let err = table
        .add_column(ColumnDef::new("y", DataType::UInt64))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::TableStructureLocked);

    let mut stream = interpreter.execute().unwrap();
    assert_eq!(table.structure().readers(), 1);
    read_all(stream.as_mut()).unwrap();
    assert_eq!(table.structure().readers(), 1);

    drop(stream);
    assert_eq!(table.structure().readers(), 0);
    table
        .add_column(ColumnDef::new("y", DataType::UInt64))
        .unwrap();
}

/// Dropping an unread stream releases the lock.
#[test]
fn test_lock_released_on_early_drop() {
    let catalog = Catalog::new();
    let table = numbers_table(&catalog, "t", 1000, 4);
    let context = context(catalog);

    let stream = execute(query(), &context, ProcessingStage::Complete);
    drop(stream);
    assert_eq!(table.structure().readers(), 0);
}

/// A failed construction leaves no reader behind.
#[test]
fn test_lock_released_when_planning_fails() {
    let catalog = Catalog::new();
    let table = numbers_table(&catalog, "t", 10, 1);
    let context = context(catalog);

    let bad = SelectQuery::new().select(Expr::col("missing")).from_table("t");
    let err = SelectInterpreter::new(bad, &context, ProcessingStage::Complete)
        .err()
        .unwrap();
    assert_eq!(err.code(), QueryErrorCode::UnknownIdentifier);
    assert_eq!(table.structure().readers(), 0);
}

/// Subqueries lock their own tables for as long as the outer stream lives.
#[test]
fn test_subquery_tables_locked() {
    let catalog = Catalog::new();
    let outer = numbers_table(&catalog, "t", 10, 1);
    let inner = numbers_table(&catalog, "u", 10, 1);
    let context = context(catalog);

    let query = query().filter(Expr::in_subquery(
        Expr::col("x"),
        SelectQuery::new().select(Expr::col("x")).from_table("u"),
    ));
    let stream = execute(query, &context, ProcessingStage::Complete);
    assert_eq!(outer.structure().readers(), 1);
    assert_eq!(inner.structure().readers(), 1);
    drop(stream);
    assert_eq!(inner.structure().readers(), 0);
}

// =============================================================================
// DROPPED TABLES
// =============================================================================

/// A table cannot be dropped while a query reads it.
#[test]
fn test_drop_rejected_while_locked() {
    let catalog = Catalog::new();
    numbers_table(&catalog, "t", 10, 1);
    let context = context(catalog);

    let stream = execute(query(), &context, ProcessingStage::Complete);
    let err = context.catalog().detach("default", "t").unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::TableStructureLocked);
    drop(stream);
    context.catalog().detach("default", "t").unwrap();
}

/// A storage dropped after lookup cannot be locked.
#[test]
fn test_dropped_table_cannot_be_locked() {
    let catalog = Catalog::new();
    let table = numbers_table(&catalog, "t", 10, 1);
    table.structure().drop_table().unwrap();
    let err = table.lock_structure().unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::TableDropped);

    let context = context(catalog);
    let err = SelectInterpreter::new(query(), &context, ProcessingStage::Complete)
        .err()
        .unwrap();
    assert_eq!(err.code(), QueryErrorCode::TableDropped);
}
