//! Preparing IN operands
//!
//! Walks the expressions of one query level and replaces the right operand
//! of every IN / NOT IN with a set placeholder. Literal lists become sets
//! right away. Subqueries become a planned nested interpreter. It is only
//! executed together with the outer query, and its stream is drained by the
//! creating-sets step before the first block of the outer query is produced.

use std::sync::Arc;

use crate::analysis::literal_type;
use crate::block::{DataType, Value};
use crate::error::{QueryError, QueryResult};
use crate::interpreter::{Context, ProcessingStage, SelectInterpreter};
use crate::observability::Event;
use crate::query::{Expr, SelectQuery, SetPlaceholder};
use crate::stream::BoxedStream;

use super::set::{Set, SetBuilder};

/// A set that still has to be filled from a subquery stream
pub struct SubqueryForSet {
    pub set: Arc<Set>,
    pub source: BoxedStream,
}

/// A subquery set whose nested query is planned but not yet executed
pub struct PlannedSubquerySet {
    set: Arc<Set>,
    interpreter: SelectInterpreter,
}

impl PlannedSubquerySet {
    pub fn set(&self) -> &Arc<Set> {
        &self.set
    }

    /// Starts the nested query. Its table is scanned from here on.
    pub fn execute(self) -> QueryResult<SubqueryForSet> {
        Ok(SubqueryForSet {
            set: self.set,
            source: self.interpreter.execute()?,
        })
    }
}

/// Attaches sets to every IN operand of a query level
pub struct SetMaterializer<'a> {
    context: &'a Context,
    subqueries: Vec<PlannedSubquerySet>,
    next_id: usize,
}

impl<'a> SetMaterializer<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self {
            context,
            subqueries: Vec::new(),
            next_id: 1,
        }
    }

    /// Prepares every IN of `query` and returns the subquery sets to fill.
    ///
    /// Operands that already carry a set are left alone, so preparing the
    /// same tree twice creates nothing new.
    pub fn prepare(mut self, query: &mut SelectQuery) -> QueryResult<Vec<PlannedSubquerySet>> {
        for expr in query.expressions_mut() {
            self.prepare_expr(expr)?;
        }
        Ok(self.subqueries)
    }

    fn prepare_expr(&mut self, expr: &mut Expr) -> QueryResult<()> {
        match expr {
            Expr::Function { args, .. } | Expr::Tuple(args) => {
                for arg in args {
                    self.prepare_expr(arg)?;
                }
            }
            Expr::Aggregate { arg: Some(arg), .. } => self.prepare_expr(arg)?,
            Expr::In { left, right, .. } => {
                self.prepare_expr(left)?;
                if let Expr::Set(SetPlaceholder { set: Some(_), .. }) = right.as_ref() {
                    return Ok(());
                }
                let placeholder = match std::mem::replace(right.as_mut(), Expr::Asterisk) {
                    Expr::Subquery(subquery) => self.make_subquery_set(*subquery)?,
                    list @ (Expr::Tuple(_) | Expr::Literal(_)) => self.make_explicit_set(&**left, &list)?,
                    _ => {
                        return Err(QueryError::illegal_expression(
                            "Second argument of IN must be a subquery, a literal or a tuple of literals",
                        ))
                    }
                };
                **right = Expr::Set(placeholder);
            }
            _ => {}
        }
        Ok(())
    }

    fn make_subquery_set(&mut self, subquery: SelectQuery) -> QueryResult<SetPlaceholder> {
        let name = format!("_subquery{}", self.next_id);
        self.next_id += 1;

        let nested = SelectInterpreter::new(subquery, &self.context.nested(), ProcessingStage::Complete)?;
        let key_types = nested.sample_block().types();
        if key_types.iter().any(DataType::is_aggregate_state) {
            return Err(QueryError::illegal_type(
                "Subquery for IN returns aggregate states",
            ));
        }
        let set = Arc::new(Set::new(name.clone(), key_types));
        self.subqueries.push(PlannedSubquerySet {
            set: set.clone(),
            interpreter: nested,
        });
        Ok(SetPlaceholder {
            column_name: name,
            is_explicit: false,
            set: Some(set),
        })
    }

    fn make_explicit_set(&mut self, left: &Expr, list: &Expr) -> QueryResult<SetPlaceholder> {
        let arity = match left {
            Expr::Tuple(items) => items.len(),
            _ => 1,
        };
        let rows = explicit_rows(list, arity)?;
        let key_types = key_types_of(&rows)?;

        let settings = self.context.settings();
        let mut builder = SetBuilder::new(settings.max_rows_in_set, settings.set_overflow_mode);
        for row in rows {
            if !builder.insert(row)? {
                break;
            }
        }
        let name = list.column_name();
        let set = Arc::new(Set::new(name.clone(), key_types));
        let rows = builder.len();
        set.fill(builder);

        self.context.metrics().record_set_created(rows as u64);
        self.context.log(
            Event::SetCreated,
            &[("set", &name), ("rows", &rows.to_string()), ("explicit", "true")],
        );
        Ok(SetPlaceholder {
            column_name: name,
            is_explicit: true,
            set: Some(set),
        })
    }
}

/// Key tuples of a literal IN list
fn explicit_rows(list: &Expr, arity: usize) -> QueryResult<Vec<Vec<Value>>> {
    match list {
        Expr::Literal(v) if arity == 1 => Ok(vec![vec![v.clone()]]),
        Expr::Literal(_) => Err(QueryError::set_size_mismatch(arity, 1)),
        Expr::Tuple(items) if arity > 1 && items.iter().all(|i| matches!(i, Expr::Literal(_))) => {
            // `(a, b) IN (1, 2)` is a single tuple
            Ok(vec![literal_tuple(items, arity)?])
        }
        Expr::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Expr::Literal(v) if arity == 1 => Ok(vec![v.clone()]),
                Expr::Tuple(inner) => literal_tuple(inner, arity),
                Expr::Literal(_) => Err(QueryError::set_size_mismatch(arity, 1)),
                _ => Err(QueryError::illegal_expression(
                    "IN list must contain only literals",
                )),
            })
            .collect(),
        _ => Err(QueryError::illegal_expression(
            "IN list must contain only literals",
        )),
    }
}

fn literal_tuple(items: &[Expr], arity: usize) -> QueryResult<Vec<Value>> {
    if items.len() != arity {
        return Err(QueryError::set_size_mismatch(arity, items.len()));
    }
    items
        .iter()
        .map(|item| match item {
            Expr::Literal(v) => Ok(v.clone()),
            _ => Err(QueryError::illegal_expression(
                "IN list must contain only literals",
            )),
        })
        .collect()
}

/// Element types of the first row; every other row must be comparable
fn key_types_of(rows: &[Vec<Value>]) -> QueryResult<Vec<DataType>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let types: Vec<DataType> = first.iter().map(literal_type).collect();
    for row in &rows[1..] {
        for (value, ty) in row.iter().zip(&types) {
            let value_type = literal_type(value);
            if !value_type.is_comparable_with(ty) {
                return Err(QueryError::illegal_type(format!(
                    "Types of elements of IN list are not compatible: {} and {}",
                    ty, value_type
                )));
            }
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorCode;

    #[test]
    fn test_explicit_rows_single_column() {
        let list = Expr::Tuple(vec![Expr::lit(1u64), Expr::lit(2u64)]);
        let rows = explicit_rows(&list, 1).unwrap();
        assert_eq!(rows, vec![vec![Value::UInt(1)], vec![Value::UInt(2)]]);
    }

    #[test]
    fn test_explicit_rows_tuples() {
        let list = Expr::Tuple(vec![
            Expr::Tuple(vec![Expr::lit(1u64), Expr::lit("a")]),
            Expr::Tuple(vec![Expr::lit(2u64), Expr::lit("b")]),
        ]);
        let rows = explicit_rows(&list, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(key_types_of(&rows).unwrap(), vec![DataType::UInt64, DataType::String]);
    }

    #[test]
    fn test_explicit_rows_arity_mismatch() {
        let list = Expr::Tuple(vec![Expr::Tuple(vec![Expr::lit(1u64)])]);
        let err = explicit_rows(&list, 2).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::SetSizeMismatch);
    }

    #[test]
    fn test_mixed_list_types_rejected() {
        let rows = vec![vec![Value::UInt(1)], vec![Value::from("x")]];
        let err = key_types_of(&rows).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::IllegalTypeOfArgument);
    }
}
