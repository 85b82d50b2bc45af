//! Column data types
//!
//! Scalar types plus the aggregate-state type carried by partially
//! aggregated blocks (`AggregateFunction(sum, Int64)`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::{AggregateFunction, AggregateState};
use crate::error::{QueryError, QueryResult};

use super::value::Value;

/// Data type of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataType {
    /// Booleans and small flags (0 or 1)
    UInt8,
    UInt64,
    Int64,
    Float64,
    String,
    /// Mergeable partial state of an aggregate function
    AggregateFunction {
        function: AggregateFunction,
        argument: Option<Box<DataType>>,
    },
}

impl DataType {
    /// Returns the type name
    pub fn name(&self) -> String {
        match self {
            DataType::UInt8 => "UInt8".to_string(),
            DataType::UInt64 => "UInt64".to_string(),
            DataType::Int64 => "Int64".to_string(),
            DataType::Float64 => "Float64".to_string(),
            DataType::String => "String".to_string(),
            DataType::AggregateFunction { function, argument } => match argument {
                Some(arg) => format!("AggregateFunction({}, {})", function.name(), arg.name()),
                None => format!("AggregateFunction({})", function.name()),
            },
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt64 | DataType::Int64 | DataType::Float64
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt64 | DataType::Int64)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt64)
    }

    pub fn is_aggregate_state(&self) -> bool {
        matches!(self, DataType::AggregateFunction { .. })
    }

    /// Whether values of both types can be compared against each other
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        (self.is_numeric() && other.is_numeric())
            || (*self == DataType::String && *other == DataType::String)
    }

    /// The value used for the key columns of the totals row and for empty
    /// aggregates.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::UInt8 | DataType::UInt64 => Value::UInt(0),
            DataType::Int64 => Value::Int(0),
            DataType::Float64 => Value::Float(0.0),
            DataType::String => Value::String(String::new()),
            DataType::AggregateFunction { function, argument } => Value::State(Box::new(
                AggregateState::new(*function, argument.as_deref()),
            )),
        }
    }

    /// Converts a value into this type's representation.
    ///
    /// Used where a computed value must match a statically inferred type
    /// exactly (for example after arithmetic on mixed integer types).
    pub fn coerce(&self, value: Value) -> QueryResult<Value> {
        let coerced = match (self, value) {
            (DataType::UInt8 | DataType::UInt64, Value::UInt(u)) => Value::UInt(u),
            (DataType::UInt8 | DataType::UInt64, Value::Int(i)) if i >= 0 => Value::UInt(i as u64),
            (DataType::Int64, Value::Int(i)) => Value::Int(i),
            (DataType::Int64, Value::UInt(u)) => Value::Int(u as i64),
            (DataType::Float64, v @ (Value::UInt(_) | Value::Int(_) | Value::Float(_))) => {
                Value::Float(v.as_f64())
            }
            (DataType::String, Value::String(s)) => Value::String(s),
            (DataType::AggregateFunction { .. }, v @ Value::State(_)) => v,
            (ty, v) => {
                return Err(QueryError::illegal_type(format!(
                    "Cannot convert value {} to type {}",
                    v, ty
                )))
            }
        };
        Ok(coerced)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DataType {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s {
            "UInt8" => Ok(DataType::UInt8),
            "UInt64" => Ok(DataType::UInt64),
            "Int64" => Ok(DataType::Int64),
            "Float64" => Ok(DataType::Float64),
            "String" => Ok(DataType::String),
            other => Err(QueryError::illegal_type(format!(
                "Unknown data type '{}'",
                other
            ))),
        }
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.name()
    }
}

impl TryFrom<String> for DataType {
    type Error = QueryError;

    fn try_from(s: String) -> QueryResult<Self> {
        s.parse()
    }
}

/// Name and type of a column, as declared by a table or produced by a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!("UInt64".parse::<DataType>().unwrap(), DataType::UInt64);
        assert_eq!("String".parse::<DataType>().unwrap(), DataType::String);
        assert!("Decimal".parse::<DataType>().is_err());
    }

    #[test]
    fn test_state_type_name() {
        let ty = DataType::AggregateFunction {
            function: AggregateFunction::Sum,
            argument: Some(Box::new(DataType::Int64)),
        };
        assert_eq!(ty.name(), "AggregateFunction(sum, Int64)");
        assert!(ty.is_aggregate_state());
    }

    #[test]
    fn test_coerce_mixed_integers() {
        assert_eq!(
            DataType::Int64.coerce(Value::UInt(7)).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            DataType::Float64.coerce(Value::Int(-2)).unwrap(),
            Value::Float(-2.0)
        );
        assert!(DataType::UInt64.coerce(Value::String("x".into())).is_err());
    }

    #[test]
    fn test_column_def_json() {
        let def: ColumnDef = serde_json::from_str(r#"{"name":"a","type":"Int64"}"#).unwrap();
        assert_eq!(def, ColumnDef::new("a", DataType::Int64));
    }
}
