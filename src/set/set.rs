//! Membership sets backing IN / NOT IN

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use crate::block::{Block, DataType, Value};
use crate::config::OverflowMode;
use crate::error::{QueryError, QueryResult};

/// Filled contents of a set
#[derive(Debug, Default)]
struct SetData {
    keys: HashSet<Vec<Value>>,
    /// Filling stopped early in Break mode
    truncated: bool,
}

/// A set of key tuples shared between the expression that probes it and the
/// step that fills it.
///
/// Filling happens exactly once. Probing an unfilled set is an error.
pub struct Set {
    name: String,
    key_types: Vec<DataType>,
    data: OnceLock<SetData>,
}

impl Set {
    pub fn new(name: impl Into<String>, key_types: Vec<DataType>) -> Self {
        Self {
            name: name.into(),
            key_types,
            data: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types of the key tuple elements
    pub fn key_types(&self) -> &[DataType] {
        &self.key_types
    }

    pub fn is_created(&self) -> bool {
        self.data.get().is_some()
    }

    /// Number of keys, once filled
    pub fn len(&self) -> Option<usize> {
        self.data.get().map(|d| d.keys.len())
    }

    pub fn is_truncated(&self) -> bool {
        self.data.get().map_or(false, |d| d.truncated)
    }

    /// Stores the collected keys. Returns false if the set was already filled.
    pub fn fill(&self, builder: SetBuilder) -> bool {
        self.data
            .set(SetData {
                keys: builder.keys,
                truncated: builder.truncated,
            })
            .is_ok()
    }

    pub fn contains(&self, key: &[Value]) -> QueryResult<bool> {
        match self.data.get() {
            Some(data) => Ok(data.keys.contains(key)),
            None => Err(QueryError::set_not_created(&self.name)),
        }
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("name", &self.name)
            .field("key_types", &self.key_types)
            .field("rows", &self.len())
            .finish()
    }
}

/// Accumulates keys for a set, enforcing the row limit
#[derive(Debug)]
pub struct SetBuilder {
    keys: HashSet<Vec<Value>>,
    max_rows: usize,
    overflow_mode: OverflowMode,
    truncated: bool,
}

impl SetBuilder {
    /// `max_rows` of 0 means unlimited
    pub fn new(max_rows: usize, overflow_mode: OverflowMode) -> Self {
        Self {
            keys: HashSet::new(),
            max_rows,
            overflow_mode,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Adds one key. Returns false once no more keys should be added.
    pub fn insert(&mut self, key: Vec<Value>) -> QueryResult<bool> {
        if self.truncated {
            return Ok(false);
        }
        if self.max_rows > 0 && self.keys.len() >= self.max_rows && !self.keys.contains(&key) {
            return match self.overflow_mode {
                OverflowMode::Break => {
                    self.truncated = true;
                    Ok(false)
                }
                // Any is not meaningful for sets and behaves like Throw
                OverflowMode::Throw | OverflowMode::Any => {
                    Err(QueryError::too_many_rows_in_set(self.max_rows))
                }
            };
        }
        self.keys.insert(key);
        Ok(true)
    }

    /// Adds every row of a block. Returns false once no more keys should be
    /// added.
    pub fn insert_block(&mut self, block: &Block) -> QueryResult<bool> {
        let positions: Vec<usize> = (0..block.num_columns()).collect();
        for row in 0..block.rows() {
            if !self.insert(block.key(&positions, row))? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Column;
    use crate::error::QueryErrorCode;

    #[test]
    fn test_probe_before_fill_fails() {
        let set = Set::new("_subquery1", vec![DataType::UInt64]);
        let err = set.contains(&[Value::UInt(1)]).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::SetNotCreated);
    }

    #[test]
    fn test_fill_once() {
        let set = Set::new("s", vec![DataType::UInt64]);
        let mut builder = SetBuilder::new(0, OverflowMode::Throw);
        builder.insert(vec![Value::UInt(3)]).unwrap();
        assert!(set.fill(builder));
        assert!(!set.fill(SetBuilder::new(0, OverflowMode::Throw)));
        assert!(set.contains(&[Value::Int(3)]).unwrap());
        assert_eq!(set.len(), Some(1));
    }

    #[test]
    fn test_row_limit_throw() {
        let mut builder = SetBuilder::new(2, OverflowMode::Throw);
        let block = Block::new(vec![Column::new(
            "x",
            DataType::UInt64,
            vec![1u64.into(), 2u64.into(), 2u64.into(), 3u64.into()],
        )]);
        let err = builder.insert_block(&block).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TooManyRowsInSet);
    }

    #[test]
    fn test_row_limit_break() {
        let mut builder = SetBuilder::new(2, OverflowMode::Break);
        for i in 0..5u64 {
            builder.insert(vec![Value::UInt(i)]).unwrap();
        }
        assert_eq!(builder.len(), 2);
        let set = Set::new("s", vec![DataType::UInt64]);
        set.fill(builder);
        assert!(set.is_truncated());
    }
}
