//! Scalar functions
//!
//! Each function infers its return type from the argument types at planning
//! time and computes values of exactly that type at execution time.

use crate::block::{DataType, Value};
use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Plus,
    Minus,
    Multiply,
    Divide,
    IntDiv,
    Modulo,
    Negate,
    Equals,
    NotEquals,
    Less,
    Greater,
    LessOrEquals,
    GreaterOrEquals,
    And,
    Or,
    Not,
    Length,
    Lower,
    Upper,
    Concat,
    ToString,
}

impl ScalarFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "plus" => ScalarFunction::Plus,
            "minus" => ScalarFunction::Minus,
            "multiply" => ScalarFunction::Multiply,
            "divide" => ScalarFunction::Divide,
            "intDiv" => ScalarFunction::IntDiv,
            "modulo" => ScalarFunction::Modulo,
            "negate" => ScalarFunction::Negate,
            "equals" => ScalarFunction::Equals,
            "notEquals" => ScalarFunction::NotEquals,
            "less" => ScalarFunction::Less,
            "greater" => ScalarFunction::Greater,
            "lessOrEquals" => ScalarFunction::LessOrEquals,
            "greaterOrEquals" => ScalarFunction::GreaterOrEquals,
            "and" => ScalarFunction::And,
            "or" => ScalarFunction::Or,
            "not" => ScalarFunction::Not,
            "length" => ScalarFunction::Length,
            "lower" => ScalarFunction::Lower,
            "upper" => ScalarFunction::Upper,
            "concat" => ScalarFunction::Concat,
            "toString" => ScalarFunction::ToString,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Plus => "plus",
            ScalarFunction::Minus => "minus",
            ScalarFunction::Multiply => "multiply",
            ScalarFunction::Divide => "divide",
            ScalarFunction::IntDiv => "intDiv",
            ScalarFunction::Modulo => "modulo",
            ScalarFunction::Negate => "negate",
            ScalarFunction::Equals => "equals",
            ScalarFunction::NotEquals => "notEquals",
            ScalarFunction::Less => "less",
            ScalarFunction::Greater => "greater",
            ScalarFunction::LessOrEquals => "lessOrEquals",
            ScalarFunction::GreaterOrEquals => "greaterOrEquals",
            ScalarFunction::And => "and",
            ScalarFunction::Or => "or",
            ScalarFunction::Not => "not",
            ScalarFunction::Length => "length",
            ScalarFunction::Lower => "lower",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Concat => "concat",
            ScalarFunction::ToString => "toString",
        }
    }

    /// Infers the return type, rejecting wrong arity or argument types
    pub fn return_type(&self, args: &[DataType]) -> QueryResult<DataType> {
        use ScalarFunction::*;
        match self {
            Plus | Minus | Multiply | Divide | IntDiv | Modulo => {
                self.expect_arity(args, 2)?;
                self.expect_numeric(args)?;
                Ok(match self {
                    Divide => DataType::Float64,
                    Minus if !args.iter().any(|a| *a == DataType::Float64) => DataType::Int64,
                    _ => numeric_supertype(&args[0], &args[1]),
                })
            }
            Negate => {
                self.expect_arity(args, 1)?;
                self.expect_numeric(args)?;
                Ok(if args[0] == DataType::Float64 {
                    DataType::Float64
                } else {
                    DataType::Int64
                })
            }
            Equals | NotEquals | Less | Greater | LessOrEquals | GreaterOrEquals => {
                self.expect_arity(args, 2)?;
                if !args[0].is_comparable_with(&args[1]) {
                    return Err(QueryError::illegal_type(format!(
                        "Illegal types of arguments ({}, {}) of function {}",
                        args[0],
                        args[1],
                        self.name()
                    )));
                }
                Ok(DataType::UInt8)
            }
            And | Or => {
                if args.len() < 2 {
                    return Err(QueryError::arguments_mismatch(self.name(), "at least 2", args.len()));
                }
                self.expect_numeric(args)?;
                Ok(DataType::UInt8)
            }
            Not => {
                self.expect_arity(args, 1)?;
                self.expect_numeric(args)?;
                Ok(DataType::UInt8)
            }
            Length => {
                self.expect_arity(args, 1)?;
                self.expect_strings(args)?;
                Ok(DataType::UInt64)
            }
            Lower | Upper => {
                self.expect_arity(args, 1)?;
                self.expect_strings(args)?;
                Ok(DataType::String)
            }
            Concat => {
                if args.len() < 2 {
                    return Err(QueryError::arguments_mismatch(self.name(), "at least 2", args.len()));
                }
                self.expect_strings(args)?;
                Ok(DataType::String)
            }
            ToString => {
                self.expect_arity(args, 1)?;
                if args[0].is_aggregate_state() {
                    return Err(self.illegal_argument(&args[0]));
                }
                Ok(DataType::String)
            }
        }
    }

    /// Computes one row. `result_type` is the type inferred by `return_type`.
    pub fn execute(&self, args: &[&Value], result_type: &DataType) -> QueryResult<Value> {
        use ScalarFunction::*;
        let value = match self {
            Plus => arithmetic(args[0], args[1], result_type, |a, b| a.wrapping_add(b), |a, b| a.wrapping_add(b), |a, b| a + b),
            Minus => arithmetic(args[0], args[1], result_type, |a, b| a.wrapping_sub(b), |a, b| a.wrapping_sub(b), |a, b| a - b),
            Multiply => arithmetic(args[0], args[1], result_type, |a, b| a.wrapping_mul(b), |a, b| a.wrapping_mul(b), |a, b| a * b),
            Divide => Value::Float(args[0].as_f64() / args[1].as_f64()),
            IntDiv | Modulo => {
                if args[1].as_f64() == 0.0 {
                    return Err(QueryError::illegal_division());
                }
                match (self, result_type) {
                    (IntDiv, DataType::Float64) => Value::Float((args[0].as_f64() / args[1].as_f64()).trunc()),
                    (_, DataType::Float64) => Value::Float(args[0].as_f64() % args[1].as_f64()),
                    (IntDiv, DataType::UInt64) => Value::UInt(args[0].as_u64() / args[1].as_u64()),
                    (_, DataType::UInt64) => Value::UInt(args[0].as_u64() % args[1].as_u64()),
                    (IntDiv, _) => Value::Int(args[0].as_i64().wrapping_div(args[1].as_i64())),
                    (_, _) => Value::Int(args[0].as_i64().wrapping_rem(args[1].as_i64())),
                }
            }
            Negate => match result_type {
                DataType::Float64 => Value::Float(-args[0].as_f64()),
                _ => Value::Int(args[0].as_i64().wrapping_neg()),
            },
            Equals => Value::from_bool(args[0] == args[1]),
            NotEquals => Value::from_bool(args[0] != args[1]),
            Less => Value::from_bool(args[0] < args[1]),
            Greater => Value::from_bool(args[0] > args[1]),
            LessOrEquals => Value::from_bool(args[0] <= args[1]),
            GreaterOrEquals => Value::from_bool(args[0] >= args[1]),
            And => Value::from_bool(args.iter().all(|v| v.is_true())),
            Or => Value::from_bool(args.iter().any(|v| v.is_true())),
            Not => Value::from_bool(!args[0].is_true()),
            Length => Value::UInt(args[0].as_str().map_or(0, |s| s.len() as u64)),
            Lower => Value::String(args[0].as_str().unwrap_or_default().to_lowercase()),
            Upper => Value::String(args[0].as_str().unwrap_or_default().to_uppercase()),
            Concat => Value::String(args.iter().filter_map(|v| v.as_str()).collect()),
            ToString => Value::String(args[0].to_string()),
        };
        Ok(value)
    }

    fn expect_arity(&self, args: &[DataType], expected: usize) -> QueryResult<()> {
        if args.len() != expected {
            return Err(QueryError::arguments_mismatch(
                self.name(),
                &expected.to_string(),
                args.len(),
            ));
        }
        Ok(())
    }

    fn expect_numeric(&self, args: &[DataType]) -> QueryResult<()> {
        match args.iter().find(|a| !a.is_numeric()) {
            Some(bad) => Err(self.illegal_argument(bad)),
            None => Ok(()),
        }
    }

    fn expect_strings(&self, args: &[DataType]) -> QueryResult<()> {
        match args.iter().find(|a| **a != DataType::String) {
            Some(bad) => Err(self.illegal_argument(bad)),
            None => Ok(()),
        }
    }

    fn illegal_argument(&self, data_type: &DataType) -> QueryError {
        QueryError::illegal_type(format!(
            "Illegal type {} of argument of function {}",
            data_type,
            self.name()
        ))
    }
}

/// Common type of two numeric types
fn numeric_supertype(a: &DataType, b: &DataType) -> DataType {
    if *a == DataType::Float64 || *b == DataType::Float64 {
        DataType::Float64
    } else if a.is_unsigned() && b.is_unsigned() {
        DataType::UInt64
    } else {
        DataType::Int64
    }
}

fn arithmetic(
    a: &Value,
    b: &Value,
    result_type: &DataType,
    unsigned: impl Fn(u64, u64) -> u64,
    signed: impl Fn(i64, i64) -> i64,
    float: impl Fn(f64, f64) -> f64,
) -> Value {
    match result_type {
        DataType::Float64 => Value::Float(float(a.as_f64(), b.as_f64())),
        DataType::UInt64 | DataType::UInt8 => Value::UInt(unsigned(a.as_u64(), b.as_u64())),
        _ => Value::Int(signed(a.as_i64(), b.as_i64())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(function: ScalarFunction, args: &[Value], types: &[DataType]) -> QueryResult<Value> {
        let result_type = function.return_type(types)?;
        let refs: Vec<&Value> = args.iter().collect();
        function.execute(&refs, &result_type)
    }

    #[test]
    fn test_plus_type_inference() {
        let f = ScalarFunction::Plus;
        assert_eq!(f.return_type(&[DataType::UInt64, DataType::UInt8]).unwrap(), DataType::UInt64);
        assert_eq!(f.return_type(&[DataType::UInt64, DataType::Int64]).unwrap(), DataType::Int64);
        assert_eq!(f.return_type(&[DataType::Int64, DataType::Float64]).unwrap(), DataType::Float64);
        assert!(f.return_type(&[DataType::String, DataType::UInt64]).is_err());
    }

    #[test]
    fn test_minus_of_unsigned_is_signed() {
        let v = run(
            ScalarFunction::Minus,
            &[Value::UInt(1), Value::UInt(3)],
            &[DataType::UInt64, DataType::UInt64],
        )
        .unwrap();
        assert_eq!(v, Value::Int(-2));
    }

    #[test]
    fn test_modulo_by_zero() {
        let err = run(
            ScalarFunction::Modulo,
            &[Value::UInt(5), Value::UInt(0)],
            &[DataType::UInt64, DataType::UInt64],
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::error::QueryErrorCode::IllegalDivision);
    }

    #[test]
    fn test_comparison_requires_compatible_types() {
        let f = ScalarFunction::Equals;
        assert!(f.return_type(&[DataType::String, DataType::UInt64]).is_err());
        let v = run(
            f,
            &[Value::UInt(2), Value::Int(2)],
            &[DataType::UInt64, DataType::Int64],
        )
        .unwrap();
        assert_eq!(v, Value::UInt(1));
    }

    #[test]
    fn test_string_functions() {
        let v = run(
            ScalarFunction::Concat,
            &[Value::from("ab"), Value::from("CD")],
            &[DataType::String, DataType::String],
        )
        .unwrap();
        assert_eq!(v, Value::from("abCD"));
        let len = run(ScalarFunction::Length, &[Value::from("abc")], &[DataType::String]).unwrap();
        assert_eq!(len, Value::UInt(3));
    }

    #[test]
    fn test_arity_checked() {
        let err = ScalarFunction::Not.return_type(&[]).unwrap_err();
        assert_eq!(err.code(), crate::error::QueryErrorCode::NumberOfArgumentsMismatch);
    }
}
