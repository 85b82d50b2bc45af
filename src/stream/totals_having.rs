//! Finalization, HAVING and the WITH TOTALS row

use crate::analysis::{AggregateState, FilterActions};
use crate::block::{Block, Column, DataType, Value};
use crate::config::TotalsMode;
use crate::error::{QueryError, QueryResult};

use super::aggregator::finalize_block;
use super::{BlockStream, BoxedStream, PlanNode};

/// Merged states of every aggregate column, with the number of groups merged
struct Accumulator {
    states: Vec<AggregateState>,
    groups: usize,
}

impl Accumulator {
    fn new(templates: &[AggregateState]) -> Self {
        Self {
            states: templates.to_vec(),
            groups: 0,
        }
    }

    fn add_row(&mut self, block: &Block, positions: &[usize], row: usize) -> QueryResult<()> {
        for (state, &position) in self.states.iter_mut().zip(positions) {
            state.merge(state_at(block, position, row)?)?;
        }
        self.groups += 1;
        Ok(())
    }

    fn merge(&mut self, other: &[AggregateState]) -> QueryResult<()> {
        for (state, other) in self.states.iter_mut().zip(other) {
            state.merge(other)?;
        }
        Ok(())
    }
}

/// Consumes partially aggregated blocks: finalizes them, applies HAVING and
/// computes the totals row according to `TotalsMode`. The overflow row never
/// reaches the output; it only contributes to the totals.
///
/// Over a non-aggregating input the stream passes blocks through and the
/// totals row holds default values.
pub struct TotalsHavingStream {
    input: BoxedStream,
    having: Option<FilterActions>,
    remove_having_column: bool,
    mode: TotalsMode,
    auto_threshold: f64,
    /// (position in input, result type) of every aggregate-state column
    state_columns: Vec<(usize, DataType)>,
    finalized_header: Block,
    header: Block,
    all: Accumulator,
    passed: Accumulator,
    overflow: Option<Vec<AggregateState>>,
    totals: Option<Block>,
    finished: bool,
}

impl TotalsHavingStream {
    pub fn new(
        input: BoxedStream,
        having: Option<FilterActions>,
        mode: TotalsMode,
        auto_threshold: f64,
    ) -> QueryResult<Self> {
        let mut state_columns = Vec::new();
        let mut templates = Vec::new();
        for (position, column) in input.header().columns().iter().enumerate() {
            if let DataType::AggregateFunction { function, argument } = &column.data_type {
                state_columns.push((position, function.result_type(argument.as_deref())?));
                templates.push(AggregateState::new(*function, argument.as_deref()));
            }
        }
        let finalized_header = finalize_block(input.header().clone())?;

        let (header, remove_having_column) = match &having {
            Some(filter) => {
                let remove = !finalized_header.has(&filter.column);
                let mut header = filter.actions.header().clone();
                if remove {
                    header.remove(&filter.column);
                }
                (header, remove)
            }
            None => (finalized_header.clone(), false),
        };

        Ok(Self {
            input,
            having,
            remove_having_column,
            mode,
            auto_threshold,
            state_columns,
            finalized_header,
            header,
            all: Accumulator::new(&templates),
            passed: Accumulator::new(&templates),
            overflow: None,
            totals: None,
            finished: false,
        })
    }

    fn state_positions(&self) -> Vec<usize> {
        self.state_columns.iter().map(|(p, _)| *p).collect()
    }

    /// Applies HAVING to a finalized block, returning the surviving rows
    /// and the mask
    fn apply_having(&self, block: Block) -> QueryResult<(Block, Vec<bool>)> {
        let filter = match &self.having {
            Some(filter) => filter,
            None => {
                let mask = vec![true; block.rows()];
                return Ok((block, mask));
            }
        };
        let mut block = filter.actions.execute(block)?;
        let mask: Vec<bool> = match block.by_name(&filter.column) {
            Some(column) => column.values.iter().map(Value::is_true).collect(),
            None => {
                return Err(QueryError::execution_failed(format!(
                    "Having column {} missing from block",
                    filter.column
                )))
            }
        };
        if self.remove_having_column {
            block.remove(&filter.column);
        }
        Ok((block.filter(&mask), mask))
    }

    fn include_overflow(&self) -> bool {
        match self.mode {
            TotalsMode::BeforeHaving | TotalsMode::AfterHavingInclusive => true,
            TotalsMode::AfterHavingExclusive => false,
            TotalsMode::AfterHavingAuto => {
                self.all.groups == 0
                    || self.passed.groups as f64 / self.all.groups as f64 >= self.auto_threshold
            }
        }
    }

    fn build_totals(&self) -> QueryResult<Block> {
        let mut totals = match self.mode {
            TotalsMode::BeforeHaving => Accumulator::new(&self.all.states),
            _ => Accumulator::new(&self.passed.states),
        };
        if let Some(overflow) = &self.overflow {
            if self.include_overflow() {
                totals.merge(overflow)?;
            }
        }

        let mut row: Vec<Value> = self
            .finalized_header
            .columns()
            .iter()
            .map(|column| column.data_type.default_value())
            .collect();
        for (state, (position, result_type)) in totals.states.iter().zip(&self.state_columns) {
            row[*position] = state.finalize(result_type);
        }
        let block = Block::from_rows(&self.finalized_header, vec![row]);

        match &self.having {
            Some(filter) => {
                let mut block = filter.actions.execute(block)?;
                if self.remove_having_column {
                    block.remove(&filter.column);
                }
                Ok(block)
            }
            None => Ok(block),
        }
    }
}

fn state_at(block: &Block, position: usize, row: usize) -> QueryResult<&AggregateState> {
    match &block.column(position).values[row] {
        Value::State(state) => Ok(state),
        other => Err(QueryError::execution_failed(format!(
            "Expected aggregate state, got {}",
            other
        ))),
    }
}

impl BlockStream for TotalsHavingStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.finished {
            return Ok(None);
        }
        let positions = self.state_positions();
        while let Some(block) = self.input.read()? {
            if block.info.is_overflows {
                let mut states = Vec::with_capacity(positions.len());
                for &position in &positions {
                    if block.rows() > 0 {
                        states.push(state_at(&block, position, 0)?.clone());
                    }
                }
                if states.len() == positions.len() {
                    self.overflow = Some(states);
                }
                continue;
            }

            for row in 0..block.rows() {
                self.all.add_row(&block, &positions, row)?;
            }
            let (filtered, mask) = self.apply_having(finalize_block(block.clone())?)?;
            if self.having.is_some() {
                for (row, keep) in mask.iter().enumerate() {
                    if *keep {
                        self.passed.add_row(&block, &positions, row)?;
                    }
                }
            } else {
                for row in 0..block.rows() {
                    self.passed.add_row(&block, &positions, row)?;
                }
            }
            if !filtered.is_empty() {
                return Ok(Some(filtered));
            }
        }
        self.totals = Some(self.build_totals()?);
        self.finished = true;
        Ok(None)
    }

    fn totals(&self) -> Option<Block> {
        self.totals.clone()
    }

    fn explain(&self) -> PlanNode {
        let mut node = PlanNode::new("TotalsHaving").detail(format!("totals: {:?}", self.mode));
        if let Some(having) = &self.having {
            node = node.detail(format!("having: {}", having.column));
        }
        node.child(self.input.explain())
    }
}
