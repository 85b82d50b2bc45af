//! SELECT query tree and its planning-time rewrites

mod ast;
pub mod rewrite;

pub use ast::{Expr, OrderByItem, SelectItem, SelectQuery, SetPlaceholder, SortDirection, TableExpr};
