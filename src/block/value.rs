//! Scalar values
//!
//! Values are totally ordered: numbers compare numerically across the
//! integer and float variants (floats by `total_cmp`), numbers sort before
//! strings, strings before aggregate states. Equality and hashing agree with
//! that ordering, so `UInt(1) == Int(1)` and both hash alike. Group keys,
//! sets and DISTINCT rely on this.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::analysis::AggregateState;

/// A single cell value
#[derive(Debug, Clone)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    String(String),
    /// Partial aggregate state (only in mergeable-stage blocks)
    State(Box<AggregateState>),
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::UInt(_) | Value::Int(_) | Value::Float(_))
    }

    /// Numeric value as f64 (0.0 for non-numbers)
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::UInt(u) => *u as f64,
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            _ => 0.0,
        }
    }

    /// Numeric value as i64, wrapping out-of-range unsigned values
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::UInt(u) => *u as i64,
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            _ => 0,
        }
    }

    /// Numeric value as u64, wrapping negative values
    pub fn as_u64(&self) -> u64 {
        match self {
            Value::UInt(u) => *u,
            Value::Int(i) => *i as u64,
            Value::Float(f) => *f as u64,
            _ => 0,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by filters: non-zero numbers and non-empty strings
    pub fn is_true(&self) -> bool {
        match self {
            Value::UInt(u) => *u != 0,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::State(_) => false,
        }
    }

    pub fn from_bool(b: bool) -> Self {
        Value::UInt(b as u64)
    }

    /// Exact integer value, when there is one
    fn exact_integer(&self) -> Option<i128> {
        match self {
            Value::UInt(u) => Some(*u as i128),
            Value::Int(i) => Some(*i as i128),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38 => {
                Some(*f as i128)
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::UInt(_) | Value::Int(_) | Value::Float(_) => 0,
            Value::String(_) => 1,
            Value::State(_) => 2,
        }
    }

    /// Converts into a JSON value for output formats
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::State(state) => serde_json::Value::String(state.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::State(_), Value::State(_)) => Ordering::Equal,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                match (a.exact_integer(), b.exact_integer()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => a.as_f64().total_cmp(&b.as_f64()),
                }
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::String(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            Value::State(_) => 2u8.hash(state),
            number => match number.exact_integer() {
                Some(i) => {
                    0u8.hash(state);
                    i.hash(state);
                }
                None => {
                    3u8.hash(state);
                    number.as_f64().to_bits().hash(state);
                }
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(u) => write!(f, "{}", u),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::State(state) => write!(f, "{}", state),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::State(_) => Err(serde::ser::Error::custom(
                "aggregate states cannot be serialized as literals",
            )),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a number or a string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::UInt(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        if v >= 0 {
            Ok(Value::UInt(v as u64))
        } else {
            Ok(Value::Int(v))
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::from_bool(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cross_variant_equality() {
        assert_eq!(Value::UInt(1), Value::Int(1));
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_ne!(Value::Float(3.5), Value::Int(3));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(Value::UInt(5));
        assert!(set.contains(&Value::Int(5)));
        assert!(set.contains(&Value::Float(5.0)));
        assert!(!set.contains(&Value::String("5".into())));
    }

    #[test]
    fn test_numbers_before_strings() {
        let mut values = vec![
            Value::String("a".into()),
            Value::Int(-1),
            Value::Float(0.5),
            Value::UInt(2),
        ];
        values.sort();
        assert_eq!(values[0], Value::Int(-1));
        assert_eq!(values[1], Value::Float(0.5));
        assert_eq!(values[2], Value::UInt(2));
        assert_eq!(values[3], Value::String("a".into()));
    }

    #[test]
    fn test_literal_json() {
        let v: Vec<Value> = serde_json::from_str(r#"[1, -2, 1.5, "x"]"#).unwrap();
        assert_eq!(v[0], Value::UInt(1));
        assert!(matches!(v[1], Value::Int(-2)));
        assert!(matches!(v[2], Value::Float(_)));
        assert_eq!(v[3], Value::from("x"));
    }
}
