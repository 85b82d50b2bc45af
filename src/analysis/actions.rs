//! Expression actions
//!
//! An `ExpressionActions` is an ordered list of steps applied to a block:
//! compute a column from an expression, or project the block to a list of
//! columns. Expressions are compiled against the input header when the
//! actions are built, so unknown identifiers, bad argument types and set
//! arity mismatches surface during planning. Applying the actions to a
//! header yields the header of the transformed stream.

use std::sync::Arc;

use crate::block::{Block, Column, DataType, Value};
use crate::error::{QueryError, QueryResult};
use crate::query::{Expr, SetPlaceholder};
use crate::set::Set;

use super::functions::ScalarFunction;

/// Static type of a literal
pub fn literal_type(value: &Value) -> DataType {
    match value {
        Value::UInt(_) => DataType::UInt64,
        Value::Int(_) => DataType::Int64,
        Value::Float(_) => DataType::Float64,
        // states never appear as literals in a parsed query
        Value::String(_) | Value::State(_) => DataType::String,
    }
}

/// An expression compiled against a known header
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    kind: CompiledKind,
    data_type: DataType,
}

#[derive(Debug, Clone)]
enum CompiledKind {
    /// Existing column, looked up by name
    Input(String),
    Constant(Value),
    Function {
        function: ScalarFunction,
        args: Vec<CompiledExpr>,
    },
    In {
        args: Vec<CompiledExpr>,
        set: Arc<Set>,
        negated: bool,
    },
}

impl CompiledExpr {
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Evaluates the expression for every row of `block`
    pub fn evaluate(&self, block: &Block) -> QueryResult<Vec<Value>> {
        let rows = block.rows();
        match &self.kind {
            CompiledKind::Input(name) => block
                .by_name(name)
                .map(|c| c.values.clone())
                .ok_or_else(|| {
                    QueryError::execution_failed(format!("Column {} missing from block", name))
                }),
            CompiledKind::Constant(value) => Ok(vec![value.clone(); rows]),
            CompiledKind::Function { function, args } => {
                let columns = args
                    .iter()
                    .map(|a| a.evaluate(block))
                    .collect::<QueryResult<Vec<_>>>()?;
                let mut out = Vec::with_capacity(rows);
                let mut row_args: Vec<&Value> = Vec::with_capacity(columns.len());
                for i in 0..rows {
                    row_args.clear();
                    row_args.extend(columns.iter().map(|c| &c[i]));
                    out.push(function.execute(&row_args, &self.data_type)?);
                }
                Ok(out)
            }
            CompiledKind::In { args, set, negated } => {
                let columns = args
                    .iter()
                    .map(|a| a.evaluate(block))
                    .collect::<QueryResult<Vec<_>>>()?;
                if rows > 0 && !set.is_created() {
                    return Err(QueryError::set_not_created(set.name()));
                }
                let mut out = Vec::with_capacity(rows);
                let mut key: Vec<Value> = Vec::with_capacity(columns.len());
                for i in 0..rows {
                    key.clear();
                    key.extend(columns.iter().map(|c| c[i].clone()));
                    let found = set.contains(&key)?;
                    out.push(Value::from_bool(found != *negated));
                }
                Ok(out)
            }
        }
    }
}

/// Compiles `expr` against the columns of `header`.
///
/// A column of `header` whose name equals the expression's canonical name is
/// reused instead of recomputing the expression.
pub fn compile(expr: &Expr, header: &Block) -> QueryResult<CompiledExpr> {
    let name = expr.column_name();
    if let Some(column) = header.by_name(&name) {
        return Ok(CompiledExpr {
            kind: CompiledKind::Input(name),
            data_type: column.data_type.clone(),
        });
    }
    match expr {
        Expr::Column(name) => Err(QueryError::unknown_identifier(name)),
        Expr::Literal(value) => Ok(CompiledExpr {
            kind: CompiledKind::Constant(value.clone()),
            data_type: literal_type(value),
        }),
        Expr::Function { name, args } => {
            let function =
                ScalarFunction::from_name(name).ok_or_else(|| QueryError::unknown_function(name))?;
            let args = args
                .iter()
                .map(|a| compile(a, header))
                .collect::<QueryResult<Vec<_>>>()?;
            let arg_types: Vec<DataType> = args.iter().map(|a| a.data_type.clone()).collect();
            let data_type = function.return_type(&arg_types)?;
            Ok(CompiledExpr {
                kind: CompiledKind::Function { function, args },
                data_type,
            })
        }
        Expr::Aggregate { .. } => Err(QueryError::illegal_aggregation(format!(
            "Aggregate function {} is found in a position where it is not allowed",
            name
        ))),
        Expr::In {
            left,
            right,
            negated,
        } => {
            let args = match left.as_ref() {
                Expr::Tuple(items) => items
                    .iter()
                    .map(|i| compile(i, header))
                    .collect::<QueryResult<Vec<_>>>()?,
                other => vec![compile(other, header)?],
            };
            let set = match right.as_ref() {
                Expr::Set(SetPlaceholder { set: Some(set), .. }) => set.clone(),
                _ => {
                    return Err(QueryError::illegal_expression(format!(
                        "Set for {} was not prepared",
                        name
                    )))
                }
            };
            if args.len() != set.key_types().len() {
                return Err(QueryError::set_size_mismatch(
                    set.key_types().len(),
                    args.len(),
                ));
            }
            for (arg, key_type) in args.iter().zip(set.key_types()) {
                if !arg.data_type.is_comparable_with(key_type) {
                    return Err(QueryError::illegal_type(format!(
                        "Types of IN operands are not compatible: {} and {}",
                        arg.data_type, key_type
                    )));
                }
            }
            Ok(CompiledExpr {
                kind: CompiledKind::In {
                    args,
                    set,
                    negated: *negated,
                },
                data_type: DataType::UInt8,
            })
        }
        Expr::Tuple(_) => Err(QueryError::illegal_expression(
            "Tuples are only allowed as operands of IN",
        )),
        Expr::Subquery(_) => Err(QueryError::illegal_expression(
            "Scalar subqueries are not supported",
        )),
        Expr::Set(_) => Err(QueryError::illegal_expression(
            "A set may only appear as the right operand of IN",
        )),
        Expr::Asterisk => Err(QueryError::illegal_expression(
            "Asterisk is only allowed in the select list",
        )),
    }
}

#[derive(Debug, Clone)]
enum Step {
    Add { name: String, expr: CompiledExpr },
    /// (source column, output name)
    Project(Vec<(String, String)>),
}

/// Ordered transformation of blocks
#[derive(Debug, Clone)]
pub struct ExpressionActions {
    steps: Vec<Step>,
    output: Block,
}

impl ExpressionActions {
    /// Empty actions over `input_header`
    pub fn new(input_header: &Block) -> Self {
        Self {
            steps: Vec::new(),
            output: input_header.clone_empty(),
        }
    }

    /// Adds a computed column for `expr` unless one already exists.
    /// Returns the column name.
    pub fn add(&mut self, expr: &Expr) -> QueryResult<String> {
        let name = expr.column_name();
        if self.output.has(&name) {
            return Ok(name);
        }
        let compiled = compile(expr, &self.output)?;
        self.output
            .insert(Column::empty(name.clone(), compiled.data_type.clone()));
        self.steps.push(Step::Add {
            name: name.clone(),
            expr: compiled,
        });
        Ok(name)
    }

    /// Restricts and renames the columns: `(source, output)` pairs
    pub fn project(&mut self, columns: Vec<(String, String)>) -> QueryResult<()> {
        let mut header = Vec::with_capacity(columns.len());
        for (source, output) in &columns {
            let column = self
                .output
                .by_name(source)
                .ok_or_else(|| QueryError::unknown_identifier(source))?;
            header.push(Column::empty(output.clone(), column.data_type.clone()));
        }
        self.output = Block::new(header);
        self.steps.push(Step::Project(columns));
        Ok(())
    }

    /// Type of a column in the output header
    pub fn type_of(&self, name: &str) -> Option<&DataType> {
        self.output.by_name(name).map(|c| &c.data_type)
    }

    /// Header of transformed blocks
    pub fn header(&self) -> &Block {
        &self.output
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the computed columns, for explain output
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Add { name, .. } => name.clone(),
                Step::Project(columns) => format!(
                    "project({})",
                    columns
                        .iter()
                        .map(|(s, o)| if s == o { s.clone() } else { format!("{} AS {}", s, o) })
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn execute(&self, mut block: Block) -> QueryResult<Block> {
        for step in &self.steps {
            match step {
                Step::Add { name, expr } => {
                    let values = expr.evaluate(&block)?;
                    block.insert(Column::new(name.clone(), expr.data_type.clone(), values));
                }
                Step::Project(columns) => {
                    let info = block.info.clone();
                    let mut projected = Vec::with_capacity(columns.len());
                    for (source, output) in columns {
                        let column = block.by_name(source).ok_or_else(|| {
                            QueryError::execution_failed(format!(
                                "Column {} missing from block",
                                source
                            ))
                        })?;
                        projected.push(Column::new(
                            output.clone(),
                            column.data_type.clone(),
                            column.values.clone(),
                        ));
                    }
                    block = Block::new(projected);
                    block.info = info;
                }
            }
        }
        Ok(block)
    }
}
