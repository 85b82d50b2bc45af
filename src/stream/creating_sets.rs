//! Filling IN sets before the outer query runs

use crate::block::Block;
use crate::error::QueryResult;
use crate::interpreter::Context;
use crate::observability::{Event, ObservationScope};
use crate::set::{SetBuilder, SubqueryForSet};

use super::{BlockStream, BoxedStream, PlanNode};

/// Drains every subquery into its set on the first read, then passes the
/// input through. A set is filled once even if several sources share it.
pub struct CreatingSetsStream {
    input: BoxedStream,
    subqueries: Vec<SubqueryForSet>,
    children: Vec<PlanNode>,
    context: Context,
    created: bool,
}

impl CreatingSetsStream {
    pub fn new(input: BoxedStream, subqueries: Vec<SubqueryForSet>, context: &Context) -> Self {
        let children = subqueries
            .iter()
            .map(|s| {
                PlanNode::new("CreatingSet")
                    .detail(s.set.name().to_string())
                    .child(s.source.explain())
            })
            .collect();
        Self {
            input,
            subqueries,
            children,
            context: context.clone(),
            created: false,
        }
    }

    fn create_sets(&mut self) -> QueryResult<()> {
        let logger = self.context.logger();
        let count = self.subqueries.len().to_string();
        let scope = ObservationScope::new(logger, "CREATING_SETS", &[("sets", &count)]);

        for subquery in self.subqueries.drain(..) {
            let SubqueryForSet { set, mut source } = subquery;
            if set.is_created() {
                continue;
            }
            let settings = self.context.settings();
            let mut builder = SetBuilder::new(settings.max_rows_in_set, settings.set_overflow_mode);
            loop {
                let block = match source.read() {
                    Ok(Some(block)) => block,
                    Ok(None) => break,
                    Err(err) => {
                        scope.fail(&err.to_string());
                        return Err(err);
                    }
                };
                match builder.insert_block(&block) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        scope.fail(&err.to_string());
                        return Err(err);
                    }
                }
            }
            let rows = builder.len();
            set.fill(builder);
            self.context.metrics().record_set_created(rows as u64);
            self.context.log(
                Event::SetCreated,
                &[
                    ("set", set.name()),
                    ("rows", &rows.to_string()),
                    ("explicit", "false"),
                ],
            );
        }

        scope.complete(&[]);
        Ok(())
    }
}

impl BlockStream for CreatingSetsStream {
    fn header(&self) -> &Block {
        self.input.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if !self.created {
            self.created = true;
            self.create_sets()?;
        }
        self.input.read()
    }

    fn totals(&self) -> Option<Block> {
        self.input.totals()
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new("CreatingSets")
            .children(self.children.clone())
            .child(self.input.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::block::{Column, DataType, Value};
    use crate::config::{OverflowMode, Settings};
    use crate::error::QueryErrorCode;
    use crate::set::Set;
    use crate::storage::Catalog;
    use crate::stream::{read_all, BlocksSource};

    fn keys(values: &[u64]) -> BoxedStream {
        let block = Block::new(vec![Column::new(
            "y",
            DataType::UInt64,
            values.iter().map(|v| Value::UInt(*v)).collect(),
        )]);
        Box::new(BlocksSource::new("keys", block.clone_empty(), vec![block]))
    }

    fn outer() -> BoxedStream {
        let header = Block::header(&[crate::block::ColumnDef::new("x", DataType::UInt64)]);
        Box::new(BlocksSource::empty(header))
    }

    #[test]
    fn test_sets_filled_before_first_block() {
        let context = Context::new(Settings::default(), Arc::new(Catalog::new()));
        let set = Arc::new(Set::new("_subquery1", vec![DataType::UInt64]));
        let mut stream = CreatingSetsStream::new(
            outer(),
            vec![SubqueryForSet {
                set: set.clone(),
                source: keys(&[1, 2, 2]),
            }],
            &context,
        );
        assert!(!set.is_created());
        assert!(read_all(&mut stream).unwrap().is_empty());
        assert_eq!(set.len(), Some(2));
        assert!(set.contains(&[Value::UInt(2)]).unwrap());
        assert_eq!(context.metrics().snapshot().sets_created, 1);
    }

    #[test]
    fn test_set_limit_throws() {
        let settings = Settings {
            max_rows_in_set: 1,
            set_overflow_mode: OverflowMode::Throw,
            ..Settings::default()
        };
        let context = Context::new(settings, Arc::new(Catalog::new()));
        let set = Arc::new(Set::new("_subquery1", vec![DataType::UInt64]));
        let mut stream = CreatingSetsStream::new(
            outer(),
            vec![SubqueryForSet {
                set,
                source: keys(&[1, 2]),
            }],
            &context,
        );
        let err = read_all(&mut stream).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TooManyRowsInSet);
    }
}
