//! Aggregation over one or more raw-row streams

use std::collections::VecDeque;
use std::thread;

use crate::block::Block;
use crate::error::{QueryError, QueryResult};

use super::aggregator::{AggregatedData, Aggregator};
use super::{BlockStream, BoxedStream, PlanNode};

/// Aggregates every input, each on its own scoped worker when there is more
/// than one, then merges the per-input results. Output is produced on the
/// first read.
pub struct AggregatingStream {
    inputs: Vec<BoxedStream>,
    aggregator: Aggregator,
    finalized: bool,
    header: Block,
    output: Option<VecDeque<Block>>,
}

impl AggregatingStream {
    pub fn new(inputs: Vec<BoxedStream>, aggregator: Aggregator, finalized: bool) -> Self {
        let header = aggregator.header(finalized);
        Self {
            inputs,
            aggregator,
            finalized,
            header,
            output: None,
        }
    }

    fn aggregate(&mut self) -> QueryResult<VecDeque<Block>> {
        let aggregator = &self.aggregator;
        let mut results: Vec<QueryResult<AggregatedData>> = if self.inputs.len() <= 1 {
            self.inputs
                .iter_mut()
                .map(|input| aggregate_input(aggregator, input.as_mut()))
                .collect()
        } else {
            thread::scope(|scope| {
                let workers: Vec<_> = self
                    .inputs
                    .iter_mut()
                    .map(|input| scope.spawn(move || aggregate_input(aggregator, input.as_mut())))
                    .collect();
                workers
                    .into_iter()
                    .map(|worker| {
                        worker.join().unwrap_or_else(|_| {
                            Err(QueryError::execution_failed("Aggregation worker panicked"))
                        })
                    })
                    .collect()
            })
        };

        let mut merged = aggregator.new_data();
        if !results.is_empty() {
            merged = results.remove(0)?;
        }
        for result in results {
            aggregator.merge_data(&mut merged, result?)?;
        }
        Ok(aggregator.convert_to_blocks(merged, self.finalized).into())
    }
}

fn aggregate_input(aggregator: &Aggregator, input: &mut dyn BlockStream) -> QueryResult<AggregatedData> {
    let mut data = aggregator.new_data();
    while let Some(block) = input.read()? {
        if !aggregator.execute_block(&block, &mut data)? {
            break;
        }
    }
    Ok(data)
}

impl BlockStream for AggregatingStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.output.is_none() {
            self.output = Some(self.aggregate()?);
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn explain(&self) -> PlanNode {
        let params = self.aggregator.params();
        let keys: Vec<&str> = params.keys.iter().map(|k| k.name.as_str()).collect();
        let aggregates: Vec<&str> = params
            .aggregates
            .iter()
            .map(|a| a.column_name.as_str())
            .collect();
        PlanNode::new("Aggregating")
            .detail(format!(
                "keys: [{}], aggregates: [{}], final: {}",
                keys.join(", "),
                aggregates.join(", "),
                self.finalized
            ))
            .children(self.inputs.iter().map(|input| input.explain()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AggregateDescription, AggregateFunction};
    use crate::block::{Column, ColumnDef, DataType, Value};
    use crate::config::OverflowMode;
    use crate::stream::{read_all, AggregationParams, BlocksSource};

    fn source(keys: &[u64]) -> BoxedStream {
        let block = Block::new(vec![Column::new(
            "k",
            DataType::UInt64,
            keys.iter().map(|k| Value::UInt(*k)).collect(),
        )]);
        Box::new(BlocksSource::new("t", block.clone_empty(), vec![block]))
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(
            AggregationParams {
                keys: vec![ColumnDef::new("k", DataType::UInt64)],
                aggregates: vec![
                    AggregateDescription::new(AggregateFunction::Count, None, "count()".into())
                        .unwrap(),
                ],
                max_rows_to_group_by: 0,
                overflow_mode: OverflowMode::Throw,
                max_block_size: 1024,
            },
            false,
        )
    }

    #[test]
    fn test_parallel_inputs_merge_into_one_result() {
        let mut stream = AggregatingStream::new(
            vec![source(&[1, 2, 2]), source(&[2, 3]), source(&[1])],
            aggregator(),
            true,
        );
        let rows: Vec<Vec<Value>> = read_all(&mut stream)
            .unwrap()
            .iter()
            .flat_map(|b| b.to_rows())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::UInt(1), Value::UInt(2)],
                vec![Value::UInt(2), Value::UInt(3)],
                vec![Value::UInt(3), Value::UInt(1)],
            ]
        );
    }

    #[test]
    fn test_partial_output_has_state_columns() {
        let stream = AggregatingStream::new(vec![source(&[1])], aggregator(), false);
        assert!(stream.header().column(1).data_type.is_aggregate_state());
        assert_eq!(stream.explain().children.len(), 1);
    }
}
