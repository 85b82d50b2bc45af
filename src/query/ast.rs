//! Query tree for SELECT
//!
//! The tree is produced by a parser (not part of this crate), by the builder
//! methods below, or decoded from JSON. During planning the interpreter owns
//! it exclusively and rewrites it (asterisk expansion, pruning, alias
//! substitution, attaching sets). Afterwards it is frozen behind an `Arc` and
//! only read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::AggregateFunction;
use crate::block::Value;
use crate::set::Set;

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Placeholder for the right operand of IN / NOT IN.
///
/// Replaces the original subquery or literal list during planning. `set`
/// stays `None` until a `Set` entity has been attached; once attached it is
/// never replaced, so re-analysing the tree reuses the same set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetPlaceholder {
    pub column_name: String,
    /// Built from a literal list rather than a subquery
    pub is_explicit: bool,
    #[serde(skip)]
    pub set: Option<Arc<Set>>,
}

/// Expression node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column or alias reference
    Column(String),
    Literal(Value),
    /// Scalar function call (`plus`, `equals`, `and`, ...)
    Function { name: String, args: Vec<Expr> },
    /// Aggregate function call; `arg` is `None` for `count()`
    Aggregate {
        function: AggregateFunction,
        arg: Option<Box<Expr>>,
    },
    /// Tuple, valid as an IN operand
    Tuple(Vec<Expr>),
    /// Subquery, valid as the right operand of IN
    Subquery(Box<SelectQuery>),
    In {
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    /// Materialized IN operand
    Set(SetPlaceholder),
    /// `*` in the select list
    Asterisk,
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn agg(function: AggregateFunction, arg: Expr) -> Self {
        Expr::Aggregate {
            function,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn count() -> Self {
        Expr::Aggregate {
            function: AggregateFunction::Count,
            arg: None,
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::func("equals", vec![left, right])
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::func("greater", vec![left, right])
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::func("less", vec![left, right])
    }

    pub fn plus(left: Expr, right: Expr) -> Self {
        Self::func("plus", vec![left, right])
    }

    pub fn modulo(left: Expr, right: Expr) -> Self {
        Self::func("modulo", vec![left, right])
    }

    pub fn in_subquery(left: Expr, query: SelectQuery) -> Self {
        Expr::In {
            left: Box::new(left),
            right: Box::new(Expr::Subquery(Box::new(query))),
            negated: false,
        }
    }

    pub fn not_in_subquery(left: Expr, query: SelectQuery) -> Self {
        Expr::In {
            left: Box::new(left),
            right: Box::new(Expr::Subquery(Box::new(query))),
            negated: true,
        }
    }

    pub fn in_list(left: Expr, values: Vec<Expr>) -> Self {
        Expr::In {
            left: Box::new(left),
            right: Box::new(Expr::Tuple(values)),
            negated: false,
        }
    }

    /// Canonical column name: the identity of this expression inside blocks.
    pub fn column_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Literal(Value::String(s)) => format!("'{}'", s.replace('\'', "\\'")),
            Expr::Literal(v) => v.to_string(),
            Expr::Function { name, args } => format!("{}({})", name, join_names(args)),
            Expr::Aggregate { function, arg } => match arg {
                Some(arg) => format!("{}({})", function.name(), arg.column_name()),
                None => format!("{}()", function.name()),
            },
            Expr::Tuple(items) => format!("tuple({})", join_names(items)),
            Expr::Subquery(_) => "_subquery".to_string(),
            Expr::In {
                left,
                right,
                negated,
            } => format!(
                "{}({}, {})",
                if *negated { "notIn" } else { "in" },
                left.column_name(),
                right.column_name()
            ),
            Expr::Set(placeholder) => placeholder.column_name.clone(),
            Expr::Asterisk => "*".to_string(),
        }
    }

    /// Whether an aggregate function occurs anywhere in this expression
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Function { args, .. } | Expr::Tuple(args) => {
                args.iter().any(Expr::contains_aggregate)
            }
            Expr::In { left, .. } => left.contains_aggregate(),
            _ => false,
        }
    }

    /// Collects column references, not descending into subqueries
    pub fn collect_identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Function { args, .. } | Expr::Tuple(args) => {
                for arg in args {
                    arg.collect_identifiers(out);
                }
            }
            Expr::Aggregate { arg: Some(arg), .. } => arg.collect_identifiers(out),
            Expr::In { left, right, .. } => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
            _ => {}
        }
    }

    /// Replaces column references through `resolve`, leaving subqueries
    /// and set placeholders untouched.
    pub fn rewrite_columns(&mut self, resolve: &dyn Fn(&str) -> Option<Expr>) {
        match self {
            Expr::Column(name) => {
                if let Some(replacement) = resolve(name) {
                    *self = replacement;
                }
            }
            Expr::Function { args, .. } | Expr::Tuple(args) => {
                for arg in args {
                    arg.rewrite_columns(resolve);
                }
            }
            Expr::Aggregate { arg: Some(arg), .. } => arg.rewrite_columns(resolve),
            Expr::In { left, .. } => left.rewrite_columns(resolve),
            _ => {}
        }
    }

    /// Whether a placeholder in this expression holds `set`
    pub fn references_set(&self, set: &Arc<Set>) -> bool {
        match self {
            Expr::Set(SetPlaceholder { set: Some(own), .. }) => Arc::ptr_eq(own, set),
            Expr::Function { args, .. } | Expr::Tuple(args) => {
                args.iter().any(|arg| arg.references_set(set))
            }
            Expr::Aggregate { arg: Some(arg), .. } => arg.references_set(set),
            Expr::In { left, right, .. } => left.references_set(set) || right.references_set(set),
            _ => false,
        }
    }
}

fn join_names(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(Expr::column_name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Item of the select list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    #[serde(default)]
    pub alias: Option<String>,
}

impl SelectItem {
    /// Name of the column this item produces in the result
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.expr.column_name())
    }
}

/// ORDER BY element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    #[serde(default)]
    pub direction: SortDirection,
}

/// FROM clause
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableExpr {
    Table {
        #[serde(default)]
        database: Option<String>,
        table: String,
    },
    Subquery(Box<SelectQuery>),
    /// Table function such as `numbers(10)`
    Function { name: String, args: Vec<Expr> },
    Join {
        left: Box<TableExpr>,
        right: Box<TableExpr>,
        #[serde(default)]
        on: Option<Expr>,
    },
}

/// A SELECT query with an optional UNION ALL chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: Option<TableExpr>,
    #[serde(rename = "where")]
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub with_totals: bool,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub union_all: Option<Box<SelectQuery>>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.select.push(SelectItem { expr, alias: None });
        self
    }

    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.select.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.from = Some(TableExpr::Table {
            database: None,
            table: table.into(),
        });
        self
    }

    pub fn from_db_table(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        self.from = Some(TableExpr::Table {
            database: Some(database.into()),
            table: table.into(),
        });
        self
    }

    pub fn from_subquery(mut self, query: SelectQuery) -> Self {
        self.from = Some(TableExpr::Subquery(Box::new(query)));
        self
    }

    pub fn from_function(mut self, name: impl Into<String>, args: Vec<Expr>) -> Self {
        self.from = Some(TableExpr::Function {
            name: name.into(),
            args,
        });
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(expr);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn with_totals(mut self) -> Self {
        self.with_totals = true;
        self
    }

    pub fn having(mut self, expr: Expr) -> Self {
        self.having = Some(expr);
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: SortDirection) -> Self {
        self.order_by.push(OrderByItem { expr, direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Appends a branch to the end of the UNION ALL chain
    pub fn union_all(mut self, branch: SelectQuery) -> Self {
        let mut tail = &mut self.union_all;
        while let Some(next) = tail {
            tail = &mut next.union_all;
        }
        *tail = Some(Box::new(branch));
        self
    }

    /// Output column names of the select list
    pub fn output_names(&self) -> Vec<String> {
        self.select.iter().map(SelectItem::output_name).collect()
    }

    /// Mutable access to every expression of this query level, excluding
    /// the FROM clause and UNION ALL branches.
    pub fn expressions_mut(&mut self) -> Vec<&mut Expr> {
        let mut exprs: Vec<&mut Expr> = Vec::new();
        exprs.extend(self.select.iter_mut().map(|item| &mut item.expr));
        if let Some(filter) = self.filter.as_mut() {
            exprs.push(filter);
        }
        exprs.extend(self.group_by.iter_mut());
        if let Some(having) = self.having.as_mut() {
            exprs.push(having);
        }
        exprs.extend(self.order_by.iter_mut().map(|item| &mut item.expr));
        exprs
    }

    /// Every expression of this query level
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut exprs: Vec<&Expr> = Vec::new();
        exprs.extend(self.select.iter().map(|item| &item.expr));
        exprs.extend(self.filter.iter());
        exprs.extend(self.group_by.iter());
        exprs.extend(self.having.iter());
        exprs.extend(self.order_by.iter().map(|item| &item.expr));
        exprs
    }
}
