//! Expression analysis of one query level
//!
//! Given a rewritten query and the columns its source provides, the analyzer
//! validates the expressions, collects GROUP BY keys and aggregates, works
//! out which source columns must be read and builds the action chains the
//! pipeline applies at each step:
//!
//! - before WHERE: computes the filter column
//! - before aggregation: computes keys and aggregate arguments
//! - before HAVING: computes the HAVING column over finalized aggregates
//! - before ORDER BY and SELECT: computes select-list and sort columns
//! - final projection: keeps and renames the select-list columns

use std::sync::Arc;

use crate::block::{Block, ColumnDef, DataType};
use crate::error::{QueryError, QueryResult};
use crate::query::{Expr, SelectQuery, SortDirection};

use super::actions::ExpressionActions;
use super::aggregates::AggregateDescription;

/// Actions that compute a filter column
#[derive(Debug, Clone)]
pub struct FilterActions {
    pub actions: Arc<ExpressionActions>,
    pub column: String,
}

/// Sort key column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    pub name: String,
    pub direction: SortDirection,
}

#[derive(Debug)]
pub struct ExpressionAnalyzer {
    source_header: Block,
    keys: Vec<ColumnDef>,
    aggregates: Vec<AggregateDescription>,
    has_aggregation: bool,
    before_where: Option<FilterActions>,
    before_aggregation: Option<Arc<ExpressionActions>>,
    before_having: Option<FilterActions>,
    before_order_and_select: Arc<ExpressionActions>,
    final_projection: Arc<ExpressionActions>,
    selected_columns: Vec<String>,
    sort_description: Vec<SortColumn>,
}

impl ExpressionAnalyzer {
    /// Analyzes `query` over a source providing `available` columns.
    ///
    /// All type and structure errors are reported here.
    pub fn new(query: &SelectQuery, available: &[ColumnDef]) -> QueryResult<Self> {
        if query.filter.as_ref().map_or(false, Expr::contains_aggregate) {
            return Err(QueryError::illegal_aggregation(
                "Aggregate function found in WHERE",
            ));
        }
        if query.group_by.iter().any(Expr::contains_aggregate) {
            return Err(QueryError::illegal_aggregation(
                "Aggregate function found in GROUP BY",
            ));
        }

        let mut aggregate_exprs: Vec<&Expr> = Vec::new();
        for item in &query.select {
            collect_aggregates(&item.expr, &mut aggregate_exprs)?;
        }
        if let Some(having) = &query.having {
            collect_aggregates(having, &mut aggregate_exprs)?;
        }
        for item in &query.order_by {
            collect_aggregates(&item.expr, &mut aggregate_exprs)?;
        }
        let has_aggregation = !query.group_by.is_empty() || !aggregate_exprs.is_empty();
        if query.having.is_some() && !has_aggregation {
            return Err(QueryError::illegal_aggregation(
                "HAVING requires GROUP BY or an aggregate function",
            ));
        }

        let source_header = Block::header(&required_source_columns(query, available));

        let before_where = match &query.filter {
            Some(filter) => {
                let mut actions = ExpressionActions::new(&source_header);
                let column = actions.add(filter)?;
                Some(FilterActions {
                    actions: Arc::new(actions),
                    column,
                })
            }
            None => None,
        };

        let mut keys: Vec<ColumnDef> = Vec::new();
        let mut aggregates: Vec<AggregateDescription> = Vec::new();
        let mut before_aggregation = None;
        let mut before_having = None;
        let post_aggregation_header = if has_aggregation {
            let mut actions = ExpressionActions::new(&source_header);
            for key in &query.group_by {
                let name = actions.add(key)?;
                if keys.iter().any(|k| k.name == name) {
                    continue;
                }
                let data_type = column_type(&actions, &name)?;
                keys.push(ColumnDef::new(name, data_type));
            }
            for expr in &aggregate_exprs {
                let column_name = expr.column_name();
                if aggregates.iter().any(|a| a.column_name == column_name) {
                    continue;
                }
                if let Expr::Aggregate { function, arg } = expr {
                    let argument = match arg {
                        Some(arg) => {
                            let name = actions.add(arg)?;
                            let data_type = column_type(&actions, &name)?;
                            Some((name, data_type))
                        }
                        None => None,
                    };
                    aggregates.push(AggregateDescription::new(*function, argument, column_name)?);
                }
            }
            before_aggregation = Some(Arc::new(actions));

            let key_names: Vec<String> = keys.iter().map(|k| k.name.clone()).collect();
            for item in &query.select {
                check_aggregated(&item.expr, &key_names)?;
            }
            for item in &query.order_by {
                check_aggregated(&item.expr, &key_names)?;
            }
            let header = aggregated_header(&keys, &aggregates, true);
            if let Some(having) = &query.having {
                check_aggregated(having, &key_names)?;
                let mut actions = ExpressionActions::new(&header);
                let column = actions.add(having)?;
                before_having = Some(FilterActions {
                    actions: Arc::new(actions),
                    column,
                });
            }
            header
        } else {
            source_header.clone()
        };

        let mut actions = ExpressionActions::new(&post_aggregation_header);
        let mut selected_columns = Vec::with_capacity(query.select.len());
        for item in &query.select {
            selected_columns.push(actions.add(&item.expr)?);
        }
        let mut sort_description = Vec::with_capacity(query.order_by.len());
        for item in &query.order_by {
            sort_description.push(SortColumn {
                name: actions.add(&item.expr)?,
                direction: item.direction,
            });
        }
        let before_order_and_select = Arc::new(actions);

        let mut final_projection = ExpressionActions::new(before_order_and_select.header());
        final_projection.project(
            selected_columns
                .iter()
                .cloned()
                .zip(query.output_names())
                .collect(),
        )?;

        Ok(Self {
            source_header,
            keys,
            aggregates,
            has_aggregation,
            before_where,
            before_aggregation,
            before_having,
            before_order_and_select,
            final_projection: Arc::new(final_projection),
            selected_columns,
            sort_description,
        })
    }

    /// Header of the blocks read from the source
    pub fn source_header(&self) -> &Block {
        &self.source_header
    }

    /// Names of the source columns the query reads
    pub fn required_source_columns(&self) -> Vec<String> {
        self.source_header.names()
    }

    pub fn has_aggregation(&self) -> bool {
        self.has_aggregation
    }

    pub fn keys(&self) -> &[ColumnDef] {
        &self.keys
    }

    pub fn aggregates(&self) -> &[AggregateDescription] {
        &self.aggregates
    }

    /// Header of aggregated blocks: keys followed by finalized values or
    /// partial states.
    pub fn aggregated_header(&self, finalized: bool) -> Block {
        aggregated_header(&self.keys, &self.aggregates, finalized)
    }

    pub fn before_where(&self) -> Option<&FilterActions> {
        self.before_where.as_ref()
    }

    pub fn before_aggregation(&self) -> Option<&Arc<ExpressionActions>> {
        self.before_aggregation.as_ref()
    }

    pub fn before_having(&self) -> Option<&FilterActions> {
        self.before_having.as_ref()
    }

    pub fn before_order_and_select(&self) -> &Arc<ExpressionActions> {
        &self.before_order_and_select
    }

    pub fn final_projection(&self) -> &Arc<ExpressionActions> {
        &self.final_projection
    }

    /// Canonical names of the select-list columns, before renaming
    pub fn selected_columns(&self) -> &[String] {
        &self.selected_columns
    }

    pub fn sort_description(&self) -> &[SortColumn] {
        &self.sort_description
    }

    /// Whether every ORDER BY column is also a select-list column
    pub fn order_by_within_select(&self) -> bool {
        self.sort_description
            .iter()
            .all(|s| self.selected_columns.contains(&s.name))
    }
}

/// Source columns referenced by the query, in source order. With none
/// referenced, the narrowest column is read so that rows can be counted.
fn required_source_columns(query: &SelectQuery, available: &[ColumnDef]) -> Vec<ColumnDef> {
    let mut identifiers = Vec::new();
    for expr in query.expressions() {
        expr.collect_identifiers(&mut identifiers);
    }
    let required: Vec<ColumnDef> = available
        .iter()
        .filter(|c| identifiers.contains(&c.name))
        .cloned()
        .collect();
    if !required.is_empty() {
        return required;
    }
    available
        .iter()
        .min_by_key(|c| type_width(&c.data_type))
        .cloned()
        .into_iter()
        .collect()
}

fn type_width(data_type: &DataType) -> usize {
    match data_type {
        DataType::UInt8 => 1,
        DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        DataType::String => 16,
        DataType::AggregateFunction { .. } => 64,
    }
}

fn aggregated_header(keys: &[ColumnDef], aggregates: &[AggregateDescription], finalized: bool) -> Block {
    let mut defs: Vec<ColumnDef> = keys.to_vec();
    defs.extend(aggregates.iter().map(|a| {
        let data_type = if finalized {
            a.result_type.clone()
        } else {
            a.state_type()
        };
        ColumnDef::new(a.column_name.clone(), data_type)
    }));
    Block::header(&defs)
}

fn column_type(actions: &ExpressionActions, name: &str) -> QueryResult<DataType> {
    actions
        .type_of(name)
        .cloned()
        .ok_or_else(|| QueryError::unknown_identifier(name))
}

/// Collects aggregate calls, rejecting nested aggregates
fn collect_aggregates<'q>(expr: &'q Expr, out: &mut Vec<&'q Expr>) -> QueryResult<()> {
    match expr {
        Expr::Aggregate { function, arg } => {
            if arg.as_ref().map_or(false, |a| a.contains_aggregate()) {
                return Err(QueryError::illegal_aggregation(format!(
                    "Aggregate function {} contains another aggregate function",
                    function.name()
                )));
            }
            out.push(expr);
        }
        Expr::Function { args, .. } | Expr::Tuple(args) => {
            for arg in args {
                collect_aggregates(arg, out)?;
            }
        }
        Expr::In { left, .. } => collect_aggregates(left, out)?,
        _ => {}
    }
    Ok(())
}

/// Checks that an expression evaluated after aggregation only uses keys and
/// aggregates.
fn check_aggregated(expr: &Expr, keys: &[String]) -> QueryResult<()> {
    if keys.contains(&expr.column_name()) {
        return Ok(());
    }
    match expr {
        Expr::Column(name) => Err(QueryError::illegal_aggregation(format!(
            "Column {} is not under aggregate function and not in GROUP BY",
            name
        ))),
        Expr::Function { args, .. } | Expr::Tuple(args) => {
            args.iter().try_for_each(|a| check_aggregated(a, keys))
        }
        Expr::In { left, .. } => check_aggregated(left, keys),
        _ => Ok(()),
    }
}
