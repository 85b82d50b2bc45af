//! Stage sequencer
//!
//! Builds the operator chain of one query level over the streams returned
//! by its source. Steps run in a fixed order; each is applied only when its
//! clause is present and it falls between the stage the source reached and
//! the requested stage.
//!
//! First stage (source stage < WithMergeableState <= target):
//! 1. Where
//! 2. Aggregation, or Expression and pre-order Distinct
//! 3. PreLimit on the sources when nothing else would reorder rows
//!
//! Second stage (source stage <= WithMergeableState < target):
//! 4. MergeAggregated when the source already aggregated
//! 5. TotalsAndHaving, or Having
//! 6. Expression and pre-order Distinct after aggregation
//! 7. Order, PreLimit, Union
//! 8. Projection, post-order Distinct, Limit

use crate::analysis::ExpressionAnalyzer;
use crate::error::QueryResult;
use crate::query::SelectQuery;
use crate::stream::{
    AggregatingStream, AggregationParams, Aggregator, BoxedStream, DistinctStream,
    ExpressionStream, FilterStream, LimitStream, MergingAggregatedStream, MergingSortedStream,
    SortingStream, TotalsHavingStream, UnionStream,
};

use super::context::Context;
use super::stage::ProcessingStage;

/// Collapses streams into one with a parallel fan-in
pub(crate) fn union_streams(mut streams: Vec<BoxedStream>) -> BoxedStream {
    if streams.len() == 1 {
        if let Some(stream) = streams.pop() {
            return stream;
        }
    }
    Box::new(UnionStream::new(streams))
}

pub(crate) struct Pipeline<'a> {
    pub query: &'a SelectQuery,
    pub analyzer: &'a ExpressionAnalyzer,
    pub context: &'a Context,
    pub to_stage: ProcessingStage,
}

impl Pipeline<'_> {
    fn aggregator(&self) -> Aggregator {
        let settings = self.context.settings();
        Aggregator::new(
            AggregationParams {
                keys: self.analyzer.keys().to_vec(),
                aggregates: self.analyzer.aggregates().to_vec(),
                max_rows_to_group_by: settings.max_rows_to_group_by,
                overflow_mode: settings.group_by_overflow_mode,
                max_block_size: settings.max_block_size,
            },
            settings.overflow_row(self.query.with_totals),
        )
    }

    fn limit(&self) -> Option<usize> {
        self.query.limit.map(|l| l as usize)
    }

    /// `offset + limit`, the most rows any single stream has to deliver
    fn limit_with_offset(&self) -> Option<usize> {
        self.limit()
            .map(|l| l.saturating_add(self.query.offset as usize))
    }

    fn expression(&self, streams: Vec<BoxedStream>) -> Vec<BoxedStream> {
        let actions = self.analyzer.before_order_and_select();
        streams
            .into_iter()
            .map(|s| Box::new(ExpressionStream::new(s, actions.clone())) as BoxedStream)
            .collect()
    }

    /// Per-stream DISTINCT before ORDER BY. Returns how many streams it was
    /// applied to, or `None` when it does not apply.
    fn pre_distinct(&self, streams: &mut Vec<BoxedStream>) -> Option<usize> {
        if !self.query.distinct || !self.analyzer.order_by_within_select() {
            return None;
        }
        let settings = self.context.settings();
        let limit_hint = if self.query.order_by.is_empty() {
            self.limit_with_offset().unwrap_or(0)
        } else {
            0
        };
        let columns = self.analyzer.selected_columns().to_vec();
        *streams = std::mem::take(streams)
            .into_iter()
            .map(|s| {
                Box::new(DistinctStream::new(
                    s,
                    columns.clone(),
                    limit_hint,
                    settings.max_rows_in_distinct,
                    settings.distinct_overflow_mode,
                )) as BoxedStream
            })
            .collect();
        Some(streams.len())
    }

    /// Applies every step between `from_stage` and the target stage. The
    /// result may still consist of several streams.
    pub fn build(
        &self,
        mut streams: Vec<BoxedStream>,
        from_stage: ProcessingStage,
    ) -> QueryResult<Vec<BoxedStream>> {
        let to_stage = self.to_stage;
        if to_stage <= from_stage {
            return Ok(streams);
        }

        let query = self.query;
        let analyzer = self.analyzer;
        let settings = self.context.settings();

        let first_stage = from_stage < ProcessingStage::WithMergeableState
            && to_stage >= ProcessingStage::WithMergeableState;
        let second_stage = from_stage <= ProcessingStage::WithMergeableState
            && to_stage > ProcessingStage::WithMergeableState;
        let need_aggregate = analyzer.has_aggregation();
        let aggregate_final = to_stage > ProcessingStage::WithMergeableState && !query.with_totals;

        let mut pre_distinct_streams = None;

        if first_stage {
            // Step 1: Where
            if let Some(filter) = analyzer.before_where() {
                streams = streams
                    .into_iter()
                    .map(|s| Box::new(FilterStream::new(s, filter.clone(), "Where")) as BoxedStream)
                    .collect();
            }

            // Step 2: Aggregation, or Expression and pre-order Distinct
            if need_aggregate {
                if let Some(actions) = analyzer.before_aggregation() {
                    streams = streams
                        .into_iter()
                        .map(|s| Box::new(ExpressionStream::new(s, actions.clone())) as BoxedStream)
                        .collect();
                }
                let finalized = second_stage && aggregate_final;
                streams = vec![Box::new(AggregatingStream::new(
                    streams,
                    self.aggregator(),
                    finalized,
                ))];
            } else {
                streams = self.expression(streams);
                pre_distinct_streams = self.pre_distinct(&mut streams);
            }

            // Step 3: PreLimit on the sources
            if !second_stage && !need_aggregate && query.order_by.is_empty() {
                if let Some(rows) = self.limit_with_offset() {
                    streams = streams
                        .into_iter()
                        .map(|s| Box::new(LimitStream::pre_limit(s, rows)) as BoxedStream)
                        .collect();
                }
            }
        }

        if !second_stage {
            return Ok(streams);
        }

        if need_aggregate {
            // Step 4: MergeAggregated
            if !first_stage {
                streams = vec![Box::new(MergingAggregatedStream::new(
                    union_streams(streams),
                    self.aggregator(),
                    aggregate_final,
                ))];
            }

            // Step 5: TotalsAndHaving, or Having
            if !aggregate_final {
                streams = vec![Box::new(TotalsHavingStream::new(
                    union_streams(streams),
                    analyzer.before_having().cloned(),
                    settings.totals_mode,
                    settings.totals_auto_threshold,
                )?)];
            } else if let Some(having) = analyzer.before_having() {
                streams = streams
                    .into_iter()
                    .map(|s| Box::new(FilterStream::new(s, having.clone(), "Having")) as BoxedStream)
                    .collect();
            }

            // Step 6: Expression and pre-order Distinct
            streams = self.expression(streams);
            pre_distinct_streams = self.pre_distinct(&mut streams);
        } else if query.with_totals && !aggregate_final {
            streams = vec![Box::new(TotalsHavingStream::new(
                union_streams(streams),
                None,
                settings.totals_mode,
                settings.totals_auto_threshold,
            )?)];
        }

        // Step 7: Order, PreLimit, Union
        let sort_description = analyzer.sort_description();
        let pre_distinct_done = pre_distinct_streams.is_some();
        if !sort_description.is_empty() {
            // a sorted stream may only be cut early when its rows are unique
            // or uniqueness does not matter
            let sort_limit = if !query.distinct || pre_distinct_done {
                self.limit_with_offset().unwrap_or(0)
            } else {
                0
            };
            streams = streams
                .into_iter()
                .map(|s| {
                    Box::new(SortingStream::new(
                        s,
                        sort_description.to_vec(),
                        sort_limit,
                        settings.max_block_size,
                    )) as BoxedStream
                })
                .collect();
        }
        if streams.len() > 1 && !query.distinct {
            if let Some(rows) = self.limit_with_offset() {
                streams = streams
                    .into_iter()
                    .map(|s| Box::new(LimitStream::pre_limit(s, rows)) as BoxedStream)
                    .collect();
            }
        }
        if streams.len() > 1 {
            let merged: BoxedStream = if sort_description.is_empty() {
                Box::new(UnionStream::new(streams))
            } else {
                let merge_limit = if query.distinct {
                    0
                } else {
                    self.limit_with_offset().unwrap_or(0)
                };
                Box::new(MergingSortedStream::new(
                    streams,
                    sort_description.to_vec(),
                    settings.max_block_size,
                    merge_limit,
                )?)
            };
            streams = vec![merged];
        }

        // Step 8: Projection, post-order Distinct, Limit
        let projection = analyzer.final_projection();
        streams = streams
            .into_iter()
            .map(|s| Box::new(ExpressionStream::with_label(s, projection.clone(), "Projection")) as BoxedStream)
            .collect();

        if query.distinct && pre_distinct_streams != Some(1) {
            streams = vec![Box::new(DistinctStream::new(
                union_streams(streams),
                Vec::new(),
                self.limit_with_offset().unwrap_or(0),
                settings.max_rows_in_distinct,
                settings.distinct_overflow_mode,
            ))];
        }

        if let Some(limit) = self.limit() {
            streams = vec![Box::new(LimitStream::new(
                union_streams(streams),
                limit,
                query.offset as usize,
            ))];
        }

        Ok(streams)
    }
}
