//! Planning-time rewrites of a query level
//!
//! These run while the interpreter still owns the tree exclusively. Order
//! matters: asterisk expansion, set preparation (outside this module), alias
//! substitution, then pruning. After substitution no clause refers to a
//! select item by alias, so pruning can drop any item that is not required.

use std::collections::HashMap;

use crate::block::ColumnDef;
use crate::error::{QueryError, QueryResult};

use super::ast::{Expr, SelectItem, SelectQuery};

/// Replaces `*` in the select list with every available column
pub fn expand_asterisk(query: &mut SelectQuery, available: &[ColumnDef]) {
    if !query
        .select
        .iter()
        .any(|item| matches!(item.expr, Expr::Asterisk))
    {
        return;
    }
    let items = std::mem::take(&mut query.select);
    for item in items {
        if matches!(item.expr, Expr::Asterisk) {
            query.select.extend(available.iter().map(|c| SelectItem {
                expr: Expr::Column(c.name.clone()),
                alias: None,
            }));
        } else {
            query.select.push(item);
        }
    }
}

/// Restricts the select list to the columns an outer query requires.
///
/// Every required name must be produced by the select list. Under DISTINCT
/// the list is left intact: dropping a column would change which rows are
/// distinct.
pub fn restrict_select(query: &mut SelectQuery, required: &[String]) -> QueryResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    let outputs = query.output_names();
    if let Some(missing) = required.iter().find(|name| !outputs.contains(name)) {
        return Err(QueryError::no_such_column(missing));
    }
    if !query.distinct {
        query
            .select
            .retain(|item| required.contains(&item.output_name()));
    }
    Ok(())
}

/// Substitutes select-list aliases into the other clauses.
///
/// A select item may refer to aliases defined before it. Source columns
/// take precedence over aliases of the same name, which keeps
/// `SELECT a + 1 AS a` from referring to itself.
pub fn substitute_aliases(query: &mut SelectQuery, source: &[ColumnDef]) {
    let is_source = |name: &str| source.iter().any(|c| c.name == name);
    let mut aliases: HashMap<String, Expr> = HashMap::new();

    for item in query.select.iter_mut() {
        {
            let known = &aliases;
            item.expr
                .rewrite_columns(&|name| lookup(known, name, &is_source));
        }
        if let Some(alias) = &item.alias {
            if !is_source(alias) && *alias != item.expr.column_name() {
                aliases.insert(alias.clone(), item.expr.clone());
            }
        }
    }
    if aliases.is_empty() {
        return;
    }

    let resolve = |name: &str| lookup(&aliases, name, &is_source);
    if let Some(filter) = query.filter.as_mut() {
        filter.rewrite_columns(&resolve);
    }
    for key in query.group_by.iter_mut() {
        key.rewrite_columns(&resolve);
    }
    if let Some(having) = query.having.as_mut() {
        having.rewrite_columns(&resolve);
    }
    for item in query.order_by.iter_mut() {
        item.expr.rewrite_columns(&resolve);
    }
}

fn lookup(
    aliases: &HashMap<String, Expr>,
    name: &str,
    is_source: &dyn Fn(&str) -> bool,
) -> Option<Expr> {
    if is_source(name) {
        return None;
    }
    aliases.get(name).cloned()
}
