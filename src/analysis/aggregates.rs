//! Aggregate functions and their mergeable states

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::{DataType, Value};
use crate::error::{QueryError, QueryResult};

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Any,
    Uniq,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Any => "any",
            AggregateFunction::Uniq => "uniq",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "avg" => Some(AggregateFunction::Avg),
            "any" => Some(AggregateFunction::Any),
            "uniq" => Some(AggregateFunction::Uniq),
            _ => None,
        }
    }

    /// Type of the finalized value, validating the argument
    pub fn result_type(&self, argument: Option<&DataType>) -> QueryResult<DataType> {
        match (self, argument) {
            (AggregateFunction::Count, _) => Ok(DataType::UInt64),
            (_, None) => Err(QueryError::arguments_mismatch(self.name(), "1", 0)),
            (_, Some(arg)) if arg.is_aggregate_state() => Err(QueryError::illegal_type(format!(
                "Argument of {} cannot be an aggregate state",
                self.name()
            ))),
            (AggregateFunction::Sum, Some(arg)) => match arg {
                DataType::Float64 => Ok(DataType::Float64),
                DataType::Int64 => Ok(DataType::Int64),
                DataType::UInt8 | DataType::UInt64 => Ok(DataType::UInt64),
                other => Err(QueryError::illegal_type(format!(
                    "Illegal type {} of argument for aggregate function sum",
                    other
                ))),
            },
            (AggregateFunction::Avg, Some(arg)) => {
                if arg.is_numeric() {
                    Ok(DataType::Float64)
                } else {
                    Err(QueryError::illegal_type(format!(
                        "Illegal type {} of argument for aggregate function avg",
                        arg
                    )))
                }
            }
            (AggregateFunction::Uniq, Some(_)) => Ok(DataType::UInt64),
            (AggregateFunction::Min | AggregateFunction::Max | AggregateFunction::Any, Some(arg)) => {
                Ok(arg.clone())
            }
        }
    }

    /// Type of the partial state column
    pub fn state_type(&self, argument: Option<&DataType>) -> DataType {
        DataType::AggregateFunction {
            function: *self,
            argument: argument.map(|a| Box::new(a.clone())),
        }
    }
}

/// A mergeable partial aggregation state
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Count(u64),
    SumUInt(u64),
    SumInt(i64),
    SumFloat(f64),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: f64, count: u64 },
    Any(Option<Value>),
    Uniq(BTreeSet<Value>),
}

impl AggregateState {
    /// Fresh state for `function` over an argument of type `argument`
    pub fn new(function: AggregateFunction, argument: Option<&DataType>) -> Self {
        match function {
            AggregateFunction::Count => AggregateState::Count(0),
            AggregateFunction::Sum => match argument {
                Some(DataType::Float64) => AggregateState::SumFloat(0.0),
                Some(DataType::Int64) => AggregateState::SumInt(0),
                _ => AggregateState::SumUInt(0),
            },
            AggregateFunction::Min => AggregateState::Min(None),
            AggregateFunction::Max => AggregateState::Max(None),
            AggregateFunction::Avg => AggregateState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Any => AggregateState::Any(None),
            AggregateFunction::Uniq => AggregateState::Uniq(BTreeSet::new()),
        }
    }

    /// Accounts for one input row. `value` is `None` for `count()`.
    pub fn add(&mut self, value: Option<&Value>) {
        match (self, value) {
            (AggregateState::Count(n), _) => *n += 1,
            (_, None) => {}
            (AggregateState::SumUInt(s), Some(v)) => *s = s.wrapping_add(v.as_u64()),
            (AggregateState::SumInt(s), Some(v)) => *s = s.wrapping_add(v.as_i64()),
            (AggregateState::SumFloat(s), Some(v)) => *s += v.as_f64(),
            (AggregateState::Min(current), Some(v)) => {
                if current.as_ref().map_or(true, |c| v < c) {
                    *current = Some(v.clone());
                }
            }
            (AggregateState::Max(current), Some(v)) => {
                if current.as_ref().map_or(true, |c| v > c) {
                    *current = Some(v.clone());
                }
            }
            (AggregateState::Avg { sum, count }, Some(v)) => {
                *sum += v.as_f64();
                *count += 1;
            }
            (AggregateState::Any(current), Some(v)) => {
                if current.is_none() {
                    *current = Some(v.clone());
                }
            }
            (AggregateState::Uniq(seen), Some(v)) => {
                seen.insert(v.clone());
            }
        }
    }

    /// Merges another partial state of the same function into this one
    pub fn merge(&mut self, other: &AggregateState) -> QueryResult<()> {
        match (self, other) {
            (AggregateState::Count(a), AggregateState::Count(b)) => *a += b,
            (AggregateState::SumUInt(a), AggregateState::SumUInt(b)) => *a = a.wrapping_add(*b),
            (AggregateState::SumInt(a), AggregateState::SumInt(b)) => *a = a.wrapping_add(*b),
            (AggregateState::SumFloat(a), AggregateState::SumFloat(b)) => *a += b,
            (AggregateState::Min(a), AggregateState::Min(b)) => {
                if let Some(b) = b {
                    if a.as_ref().map_or(true, |a| b < a) {
                        *a = Some(b.clone());
                    }
                }
            }
            (AggregateState::Max(a), AggregateState::Max(b)) => {
                if let Some(b) = b {
                    if a.as_ref().map_or(true, |a| b > a) {
                        *a = Some(b.clone());
                    }
                }
            }
            (
                AggregateState::Avg { sum, count },
                AggregateState::Avg {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *sum += other_sum;
                *count += other_count;
            }
            (AggregateState::Any(a), AggregateState::Any(b)) => {
                if a.is_none() {
                    *a = b.clone();
                }
            }
            (AggregateState::Uniq(a), AggregateState::Uniq(b)) => {
                a.extend(b.iter().cloned());
            }
            (this, other) => {
                return Err(QueryError::execution_failed(format!(
                    "Cannot merge aggregate state {} into {}",
                    other, this
                )))
            }
        }
        Ok(())
    }

    /// Final value, typed as `result_type`
    pub fn finalize(&self, result_type: &DataType) -> Value {
        match self {
            AggregateState::Count(n) => Value::UInt(*n),
            AggregateState::SumUInt(s) => Value::UInt(*s),
            AggregateState::SumInt(s) => Value::Int(*s),
            AggregateState::SumFloat(s) => Value::Float(*s),
            AggregateState::Min(v) | AggregateState::Max(v) | AggregateState::Any(v) => v
                .clone()
                .unwrap_or_else(|| result_type.default_value()),
            AggregateState::Avg { sum, count } => {
                if *count == 0 {
                    Value::Float(f64::NAN)
                } else {
                    Value::Float(sum / *count as f64)
                }
            }
            AggregateState::Uniq(seen) => Value::UInt(seen.len() as u64),
        }
    }
}

impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateState::Count(n) => write!(f, "count[{}]", n),
            AggregateState::SumUInt(s) => write!(f, "sum[{}]", s),
            AggregateState::SumInt(s) => write!(f, "sum[{}]", s),
            AggregateState::SumFloat(s) => write!(f, "sum[{}]", s),
            AggregateState::Min(v) => write!(f, "min[{}]", opt(v)),
            AggregateState::Max(v) => write!(f, "max[{}]", opt(v)),
            AggregateState::Avg { sum, count } => write!(f, "avg[{}/{}]", sum, count),
            AggregateState::Any(v) => write!(f, "any[{}]", opt(v)),
            AggregateState::Uniq(seen) => write!(f, "uniq[{}]", seen.len()),
        }
    }
}

fn opt(value: &Option<Value>) -> String {
    value.as_ref().map(Value::to_string).unwrap_or_default()
}

/// One aggregate computed by a query
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDescription {
    pub function: AggregateFunction,
    /// Column holding the evaluated argument
    pub argument: Option<String>,
    pub argument_type: Option<DataType>,
    /// Canonical name of the aggregate expression
    pub column_name: String,
    pub result_type: DataType,
}

impl AggregateDescription {
    /// Describes `function` over an argument column, validating the argument type
    pub fn new(
        function: AggregateFunction,
        argument: Option<(String, DataType)>,
        column_name: String,
    ) -> QueryResult<Self> {
        let (argument, argument_type) = match argument {
            Some((name, data_type)) => (Some(name), Some(data_type)),
            None => (None, None),
        };
        let result_type = function.result_type(argument_type.as_ref())?;
        Ok(Self {
            function,
            argument,
            argument_type,
            column_name,
            result_type,
        })
    }

    pub fn state_type(&self) -> DataType {
        self.function.state_type(self.argument_type.as_ref())
    }

    pub fn new_state(&self) -> AggregateState {
        AggregateState::new(self.function, self.argument_type.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_follows_argument_type() {
        let mut state = AggregateState::new(AggregateFunction::Sum, Some(&DataType::Int64));
        state.add(Some(&Value::Int(-4)));
        state.add(Some(&Value::Int(10)));
        assert_eq!(state.finalize(&DataType::Int64), Value::Int(6));
        assert_eq!(
            AggregateFunction::Sum
                .result_type(Some(&DataType::UInt8))
                .unwrap(),
            DataType::UInt64
        );
    }

    #[test]
    fn test_merge_partial_states() {
        let mut left = AggregateState::new(AggregateFunction::Avg, Some(&DataType::UInt64));
        let mut right = left.clone();
        left.add(Some(&Value::UInt(2)));
        right.add(Some(&Value::UInt(4)));
        right.add(Some(&Value::UInt(6)));
        left.merge(&right).unwrap();
        assert_eq!(left.finalize(&DataType::Float64), Value::Float(4.0));
    }

    #[test]
    fn test_min_max_uniq() {
        let mut min = AggregateState::new(AggregateFunction::Min, Some(&DataType::String));
        let mut max = AggregateState::new(AggregateFunction::Max, Some(&DataType::String));
        let mut uniq = AggregateState::new(AggregateFunction::Uniq, Some(&DataType::String));
        for s in ["b", "a", "c", "a"] {
            let v = Value::from(s);
            min.add(Some(&v));
            max.add(Some(&v));
            uniq.add(Some(&v));
        }
        assert_eq!(min.finalize(&DataType::String), Value::from("a"));
        assert_eq!(max.finalize(&DataType::String), Value::from("c"));
        assert_eq!(uniq.finalize(&DataType::UInt64), Value::UInt(3));
    }

    #[test]
    fn test_empty_min_uses_default() {
        let state = AggregateState::new(AggregateFunction::Min, Some(&DataType::Int64));
        assert_eq!(state.finalize(&DataType::Int64), Value::Int(0));
    }

    #[test]
    fn test_merge_mismatch_rejected() {
        let mut count = AggregateState::new(AggregateFunction::Count, None);
        let sum = AggregateState::new(AggregateFunction::Sum, Some(&DataType::UInt64));
        assert!(count.merge(&sum).is_err());
    }

    #[test]
    fn test_sum_of_string_rejected() {
        assert!(AggregateFunction::Sum
            .result_type(Some(&DataType::String))
            .is_err());
        assert!(AggregateFunction::Min.result_type(None).is_err());
    }
}
