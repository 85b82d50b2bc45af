//! Hash aggregation
//!
//! Groups live in an ordered map, so aggregated output is emitted in key
//! order regardless of how many streams fed the aggregation.

use std::collections::BTreeMap;

use crate::analysis::{AggregateDescription, AggregateState};
use crate::block::{Block, Column, ColumnDef, DataType, Value};
use crate::config::OverflowMode;
use crate::error::{QueryError, QueryResult};

/// What to aggregate and under which limits
#[derive(Debug, Clone)]
pub struct AggregationParams {
    pub keys: Vec<ColumnDef>,
    pub aggregates: Vec<AggregateDescription>,
    /// Distinct keys allowed; 0 means unlimited
    pub max_rows_to_group_by: usize,
    pub overflow_mode: OverflowMode,
    pub max_block_size: usize,
}

/// Groups gathered so far
#[derive(Debug, Default)]
pub struct AggregatedData {
    groups: BTreeMap<Vec<Value>, Vec<AggregateState>>,
    /// States of rows whose keys did not fit under the limit
    overflow: Option<Vec<AggregateState>>,
}

impl AggregatedData {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Where a key that is not yet present goes
enum Slot {
    Group,
    Overflow,
    Skip,
    Stop,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    params: AggregationParams,
    overflow_row: bool,
}

impl Aggregator {
    pub fn new(params: AggregationParams, overflow_row: bool) -> Self {
        Self {
            params,
            overflow_row,
        }
    }

    pub fn params(&self) -> &AggregationParams {
        &self.params
    }

    pub fn new_data(&self) -> AggregatedData {
        AggregatedData {
            groups: BTreeMap::new(),
            overflow: self.overflow_row.then(|| self.new_states()),
        }
    }

    fn new_states(&self) -> Vec<AggregateState> {
        self.params
            .aggregates
            .iter()
            .map(AggregateDescription::new_state)
            .collect()
    }

    /// Header of the produced blocks: keys, then finalized values or states
    pub fn header(&self, finalized: bool) -> Block {
        let mut defs = self.params.keys.clone();
        defs.extend(self.params.aggregates.iter().map(|a| {
            let data_type = if finalized {
                a.result_type.clone()
            } else {
                a.state_type()
            };
            ColumnDef::new(a.column_name.clone(), data_type)
        }));
        Block::header(&defs)
    }

    /// Decides where a new key goes once the limit is reached
    fn slot_for_new_key(&self, data: &AggregatedData) -> QueryResult<Slot> {
        let limit = self.params.max_rows_to_group_by;
        if limit == 0 || data.groups.len() < limit {
            return Ok(Slot::Group);
        }
        match self.params.overflow_mode {
            OverflowMode::Throw => Err(QueryError::too_many_rows_to_group_by(limit)),
            OverflowMode::Break => Ok(Slot::Stop),
            OverflowMode::Any if data.overflow.is_some() => Ok(Slot::Overflow),
            OverflowMode::Any => Ok(Slot::Skip),
        }
    }

    /// Aggregates one block of raw rows. Returns false once no more input
    /// should be read.
    pub fn execute_block(&self, block: &Block, data: &mut AggregatedData) -> QueryResult<bool> {
        let key_positions = positions(block, self.params.keys.iter().map(|k| k.name.as_str()))?;
        let arg_positions = self
            .params
            .aggregates
            .iter()
            .map(|a| match &a.argument {
                Some(name) => position(block, name).map(Some),
                None => Ok(None),
            })
            .collect::<QueryResult<Vec<_>>>()?;

        for row in 0..block.rows() {
            let key = block.key(&key_positions, row);
            let states = if let Some(states) = data.groups.get_mut(&key) {
                states
            } else {
                match self.slot_for_new_key(data)? {
                    Slot::Group => data.groups.entry(key).or_insert_with(|| self.new_states()),
                    Slot::Overflow => match data.overflow.as_mut() {
                        Some(states) => states,
                        None => continue,
                    },
                    Slot::Skip => continue,
                    Slot::Stop => return Ok(false),
                }
            };
            for (state, position) in states.iter_mut().zip(&arg_positions) {
                state.add(position.map(|p| &block.column(p).values[row]));
            }
        }
        Ok(true)
    }

    /// Merges a block of partial states (keys followed by state columns)
    pub fn merge_block(&self, block: &Block, data: &mut AggregatedData) -> QueryResult<()> {
        let key_positions = positions(block, self.params.keys.iter().map(|k| k.name.as_str()))?;
        let state_positions = positions(
            block,
            self.params.aggregates.iter().map(|a| a.column_name.as_str()),
        )?;

        for row in 0..block.rows() {
            let incoming = state_positions
                .iter()
                .map(|&p| match &block.column(p).values[row] {
                    Value::State(state) => Ok(state.as_ref()),
                    other => Err(QueryError::execution_failed(format!(
                        "Expected aggregate state, got {}",
                        other
                    ))),
                })
                .collect::<QueryResult<Vec<&AggregateState>>>()?;

            let states = if block.info.is_overflows {
                data.overflow.get_or_insert_with(|| self.new_states())
            } else {
                let key = block.key(&key_positions, row);
                if let Some(states) = data.groups.get_mut(&key) {
                    states
                } else {
                    match self.slot_for_new_key(data)? {
                        Slot::Group => data.groups.entry(key).or_insert_with(|| self.new_states()),
                        Slot::Overflow => match data.overflow.as_mut() {
                            Some(states) => states,
                            None => continue,
                        },
                        Slot::Skip => continue,
                        Slot::Stop => return Ok(()),
                    }
                }
            };
            for (state, other) in states.iter_mut().zip(incoming) {
                state.merge(other)?;
            }
        }
        Ok(())
    }

    /// Merges data aggregated by another worker
    pub fn merge_data(&self, into: &mut AggregatedData, from: AggregatedData) -> QueryResult<()> {
        if let Some(overflow) = from.overflow {
            let target = into.overflow.get_or_insert_with(|| self.new_states());
            for (state, other) in target.iter_mut().zip(&overflow) {
                state.merge(other)?;
            }
        }
        for (key, incoming) in from.groups {
            let states = if let Some(states) = into.groups.get_mut(&key) {
                states
            } else {
                match self.slot_for_new_key(into)? {
                    Slot::Group => into.groups.entry(key).or_insert_with(|| self.new_states()),
                    Slot::Overflow => match into.overflow.as_mut() {
                        Some(states) => states,
                        None => continue,
                    },
                    Slot::Skip => continue,
                    Slot::Stop => break,
                }
            };
            for (state, other) in states.iter_mut().zip(&incoming) {
                state.merge(other)?;
            }
        }
        Ok(())
    }

    /// Converts aggregated data into blocks: the overflow row first (flagged
    /// `is_overflows`), then groups in key order. Aggregation without keys
    /// always yields one row.
    pub fn convert_to_blocks(&self, mut data: AggregatedData, finalized: bool) -> Vec<Block> {
        let header = self.header(finalized);
        let mut blocks = Vec::new();

        if let Some(overflow) = data.overflow.take() {
            let keys: Vec<Value> = self
                .params
                .keys
                .iter()
                .map(|k| k.data_type.default_value())
                .collect();
            let mut block = Block::from_rows(&header, vec![self.output_row(keys, overflow, finalized)]);
            block.info.is_overflows = true;
            blocks.push(block);
        }

        if self.params.keys.is_empty() && data.groups.is_empty() {
            data.groups.insert(Vec::new(), self.new_states());
        }

        let block_size = self.params.max_block_size.max(1);
        let mut rows = Vec::with_capacity(block_size.min(data.groups.len()));
        for (key, states) in data.groups {
            rows.push(self.output_row(key, states, finalized));
            if rows.len() == block_size {
                blocks.push(Block::from_rows(&header, std::mem::take(&mut rows)));
            }
        }
        if !rows.is_empty() {
            blocks.push(Block::from_rows(&header, rows));
        }
        blocks
    }

    fn output_row(&self, mut key: Vec<Value>, states: Vec<AggregateState>, finalized: bool) -> Vec<Value> {
        key.extend(
            states
                .into_iter()
                .zip(&self.params.aggregates)
                .map(|(state, description)| {
                    if finalized {
                        state.finalize(&description.result_type)
                    } else {
                        Value::State(Box::new(state))
                    }
                }),
        );
        key
    }
}

/// Replaces every aggregate-state column by its finalized values
pub fn finalize_block(block: Block) -> QueryResult<Block> {
    let info = block.info.clone();
    let columns = block
        .into_columns()
        .into_iter()
        .map(|column| match &column.data_type {
            DataType::AggregateFunction { function, argument } => {
                let result_type = function.result_type(argument.as_deref())?;
                let values = column
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::State(state) => Ok(state.finalize(&result_type)),
                        other => Err(QueryError::execution_failed(format!(
                            "Expected aggregate state in {}, got {}",
                            column.name, other
                        ))),
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Column::new(column.name.clone(), result_type, values))
            }
            _ => Ok(column),
        })
        .collect::<QueryResult<Vec<_>>>()?;
    let mut block = Block::new(columns);
    block.info = info;
    Ok(block)
}

fn position(block: &Block, name: &str) -> QueryResult<usize> {
    block.position(name).ok_or_else(|| {
        QueryError::execution_failed(format!("Column {} missing from aggregated block", name))
    })
}

fn positions<'a>(block: &Block, names: impl Iterator<Item = &'a str>) -> QueryResult<Vec<usize>> {
    names.map(|n| position(block, n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AggregateFunction;
    use crate::error::QueryErrorCode;

    fn params(limit: usize, mode: OverflowMode) -> AggregationParams {
        AggregationParams {
            keys: vec![ColumnDef::new("k", DataType::UInt64)],
            aggregates: vec![
                AggregateDescription::new(AggregateFunction::Count, None, "count()".into()).unwrap(),
                AggregateDescription::new(
                    AggregateFunction::Sum,
                    Some(("v".into(), DataType::UInt64)),
                    "sum(v)".into(),
                )
                .unwrap(),
            ],
            max_rows_to_group_by: limit,
            overflow_mode: mode,
            max_block_size: 2,
        }
    }

    fn input(keys: &[u64]) -> Block {
        Block::new(vec![
            Column::new("k", DataType::UInt64, keys.iter().map(|k| Value::UInt(*k)).collect()),
            Column::new("v", DataType::UInt64, keys.iter().map(|_| Value::UInt(10)).collect()),
        ])
    }

    #[test]
    fn test_groups_in_key_order() {
        let aggregator = Aggregator::new(params(0, OverflowMode::Throw), false);
        let mut data = aggregator.new_data();
        aggregator.execute_block(&input(&[3, 1, 3, 2]), &mut data).unwrap();
        let blocks = aggregator.convert_to_blocks(data, true);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].row(0), vec![Value::UInt(1), Value::UInt(1), Value::UInt(10)]);
        assert_eq!(blocks[1].row(0), vec![Value::UInt(3), Value::UInt(2), Value::UInt(20)]);
    }

    #[test]
    fn test_throw_over_limit() {
        let aggregator = Aggregator::new(params(2, OverflowMode::Throw), false);
        let mut data = aggregator.new_data();
        let err = aggregator
            .execute_block(&input(&[1, 2, 3]), &mut data)
            .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TooManyRowsToGroupBy);
    }

    #[test]
    fn test_break_stops_input() {
        let aggregator = Aggregator::new(params(2, OverflowMode::Break), false);
        let mut data = aggregator.new_data();
        let more = aggregator
            .execute_block(&input(&[1, 2, 3, 1]), &mut data)
            .unwrap();
        assert!(!more);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_any_routes_to_overflow_row() {
        let aggregator = Aggregator::new(params(1, OverflowMode::Any), true);
        let mut data = aggregator.new_data();
        aggregator.execute_block(&input(&[1, 2, 3, 1]), &mut data).unwrap();
        let blocks = aggregator.convert_to_blocks(data, true);
        assert!(blocks[0].info.is_overflows);
        assert_eq!(blocks[0].row(0)[1], Value::UInt(2));
        assert_eq!(blocks[1].to_rows(), vec![vec![Value::UInt(1), Value::UInt(2), Value::UInt(20)]]);
    }

    #[test]
    fn test_merge_partial_states() {
        let aggregator = Aggregator::new(params(0, OverflowMode::Throw), false);
        let mut left = aggregator.new_data();
        aggregator.execute_block(&input(&[1, 2]), &mut left).unwrap();
        let mut right = aggregator.new_data();
        aggregator.execute_block(&input(&[2, 5]), &mut right).unwrap();

        let mut merged = aggregator.new_data();
        for block in aggregator.convert_to_blocks(left, false) {
            aggregator.merge_block(&block, &mut merged).unwrap();
        }
        for block in aggregator.convert_to_blocks(right, false) {
            aggregator.merge_block(&block, &mut merged).unwrap();
        }
        let rows: Vec<Vec<Value>> = aggregator
            .convert_to_blocks(merged, true)
            .iter()
            .flat_map(|b| b.to_rows())
            .collect();
        assert_eq!(rows[1], vec![Value::UInt(2), Value::UInt(2), Value::UInt(20)]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_finalize_block() {
        let aggregator = Aggregator::new(params(0, OverflowMode::Throw), false);
        let mut data = aggregator.new_data();
        aggregator.execute_block(&input(&[4]), &mut data).unwrap();
        let states = aggregator.convert_to_blocks(data, false).remove(0);
        let finalized = finalize_block(states).unwrap();
        assert!(finalized.same_structure(&aggregator.header(true)));
        assert_eq!(finalized.row(0)[2], Value::UInt(10));
    }

    #[test]
    fn test_no_keys_yields_one_row() {
        let mut p = params(0, OverflowMode::Throw);
        p.keys.clear();
        let aggregator = Aggregator::new(p, false);
        let blocks = aggregator.convert_to_blocks(aggregator.new_data(), true);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].row(0), vec![Value::UInt(0), Value::UInt(0)]);
    }
}
