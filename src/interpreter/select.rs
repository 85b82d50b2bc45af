//! SELECT interpreter
//!
//! Construction plans the query: it resolves the source, takes the table
//! structure lock, rewrites the tree, prepares IN sets, analyzes the
//! expressions and computes the output schema. Nothing is read until the
//! stream returned by `execute` is pulled.

use std::sync::Arc;

use crate::analysis::{ExpressionActions, ExpressionAnalyzer};
use crate::block::{Block, Column, ColumnDef, DataType, Value};
use crate::error::{QueryError, QueryResult};
use crate::format::{copy_data, FormatSink};
use crate::observability::Event;
use crate::query::rewrite::{expand_asterisk, restrict_select, substitute_aliases};
use crate::query::{SelectQuery, TableExpr};
use crate::set::{PlannedSubquerySet, SetMaterializer};
use crate::storage::{NumbersTable, Storage, TableStructureReadLock};
use crate::stream::{
    BlockStream, BlocksSource, BoxedStream, CreatingSetsStream, ExpressionStream, PlanNode,
    UnionStream,
};

use super::context::Context;
use super::pipeline::{union_streams, Pipeline};
use super::stage::ProcessingStage;

const DUMMY_COLUMN: &str = "dummy";

/// Where the rows of a query level come from
enum Source {
    Storage(Arc<dyn Storage>),
    /// FROM subquery, run restricted to the columns this level reads
    Subquery(SelectQuery),
    /// Stream supplied by the caller
    Input(BoxedStream),
    /// No FROM: a single row with one `dummy` column
    Dummy,
}

pub struct SelectInterpreter {
    query: Arc<SelectQuery>,
    context: Context,
    to_stage: ProcessingStage,
    source: Source,
    analyzer: ExpressionAnalyzer,
    subqueries: Vec<PlannedSubquerySet>,
    /// UNION ALL branches after this one
    branches: Vec<SelectInterpreter>,
    sample_block: Block,
    table_lock: Option<TableStructureReadLock>,
}

impl SelectInterpreter {
    /// Interprets a full query against its own source
    pub fn new(query: SelectQuery, context: &Context, to_stage: ProcessingStage) -> QueryResult<Self> {
        Self::with_input(query, context, &[], None, None, to_stage)
    }

    /// Interprets a query whose caller only needs `required_columns` of its
    /// output. Unused select items are pruned.
    pub fn with_required_columns(
        query: SelectQuery,
        context: &Context,
        required_columns: &[String],
        to_stage: ProcessingStage,
    ) -> QueryResult<Self> {
        Self::with_input(query, context, required_columns, None, None, to_stage)
    }

    /// Interprets a query over explicit table columns and, optionally, an
    /// input stream that replaces the table scan.
    pub fn with_input(
        query: SelectQuery,
        context: &Context,
        required_columns: &[String],
        table_columns: Option<Vec<ColumnDef>>,
        input: Option<BoxedStream>,
        to_stage: ProcessingStage,
    ) -> QueryResult<Self> {
        match Self::init(query, context, required_columns, table_columns, input, to_stage) {
            Ok(interpreter) => {
                context.metrics().increment_queries_planned();
                let columns = interpreter.sample_block.names().join(", ");
                context.log(
                    Event::SelectPlanned,
                    &[
                        ("columns", &columns),
                        ("depth", &context.depth().to_string()),
                        ("stage", to_stage.as_str()),
                    ],
                );
                Ok(interpreter)
            }
            Err(err) => {
                context.metrics().increment_queries_rejected();
                context.log(
                    Event::SelectRejected,
                    &[
                        ("code", err.code().code()),
                        ("depth", &context.depth().to_string()),
                        ("reason", err.message()),
                    ],
                );
                Err(err)
            }
        }
    }

    fn init(
        mut query: SelectQuery,
        context: &Context,
        required_columns: &[String],
        table_columns: Option<Vec<ColumnDef>>,
        input: Option<BoxedStream>,
        to_stage: ProcessingStage,
    ) -> QueryResult<Self> {
        // Step 1: subquery depth
        let max_depth = context.settings().max_subquery_depth;
        if context.depth() > max_depth {
            return Err(QueryError::too_deep_subqueries(context.depth(), max_depth));
        }
        let mut next_branch = query.union_all.take();

        // Step 2: resolve the source
        let storage = resolve_storage(&query, context)?;

        // Step 3: table structure lock, unless the caller supplies the rows
        let table_lock = match (&storage, &input) {
            (Some(storage), None) => {
                let lock = storage.lock_structure()?;
                context.log(Event::TableLocked, &[("table", storage.name())]);
                Some(lock)
            }
            _ => None,
        };

        // Step 4: available columns
        let table_schema = storage.as_ref().map(|s| s.columns());
        let available = match table_columns {
            Some(columns) => {
                if let Some(schema) = &table_schema {
                    if let Some(missing) = columns.iter().find(|c| !schema.contains(c)) {
                        return Err(QueryError::no_such_column(&missing.name));
                    }
                }
                columns
            }
            None => match (table_schema, &input, &query.from) {
                (Some(schema), _, _) => schema,
                (None, Some(input), _) => input.header().defs(),
                (None, None, Some(TableExpr::Subquery(subquery))) => {
                    SelectInterpreter::new((**subquery).clone(), &context.nested(), ProcessingStage::Complete)?
                        .sample_block()
                        .defs()
                }
                (None, None, _) => vec![ColumnDef::new(DUMMY_COLUMN, DataType::UInt8)],
            },
        };

        let source = match (input, storage) {
            (Some(input), _) => Source::Input(input),
            (None, Some(storage)) => Source::Storage(storage),
            (None, None) => match &query.from {
                Some(TableExpr::Subquery(subquery)) => Source::Subquery((**subquery).clone()),
                _ => Source::Dummy,
            },
        };

        // Step 5: sets for IN, aliases, then pruning. Subquery sets whose
        // IN was pruned away are dropped unexecuted.
        expand_asterisk(&mut query, &available);
        let mut subqueries = SetMaterializer::new(context).prepare(&mut query)?;
        substitute_aliases(&mut query, &available);
        restrict_select(&mut query, required_columns)?;
        let expressions = query.expressions();
        subqueries.retain(|s| expressions.iter().any(|e| e.references_set(s.set())));

        // Step 6: expression analysis
        let analyzer = ExpressionAnalyzer::new(&query, &available)?;

        let mut interpreter = Self {
            query: Arc::new(query),
            context: context.clone(),
            to_stage,
            source,
            analyzer,
            subqueries,
            branches: Vec::new(),
            sample_block: Block::default(),
            table_lock,
        };

        // Step 7: output schema
        interpreter.sample_block = interpreter.compute_sample_block()?;

        while let Some(branch) = next_branch {
            let mut branch = *branch;
            next_branch = branch.union_all.take();
            let branch =
                SelectInterpreter::with_required_columns(branch, context, required_columns, to_stage)?;
            check_union_structure(&interpreter.sample_block, branch.sample_block())?;
            interpreter.branches.push(branch);
        }

        Ok(interpreter)
    }

    /// Runs the pipeline over an empty source to learn the output header
    fn compute_sample_block(&self) -> QueryResult<Block> {
        let source: BoxedStream = Box::new(BlocksSource::empty(self.analyzer.source_header().clone()));
        let streams = self.pipeline().build(vec![source], ProcessingStage::FetchColumns)?;
        Ok(union_streams(streams).header().clone_empty())
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            query: &self.query,
            analyzer: &self.analyzer,
            context: &self.context,
            to_stage: self.to_stage,
        }
    }

    /// Header of every block the query produces
    pub fn sample_block(&self) -> &Block {
        &self.sample_block
    }

    pub fn return_types(&self) -> Vec<DataType> {
        self.sample_block.types()
    }

    /// Names of the source columns the query reads
    pub fn required_source_columns(&self) -> Vec<String> {
        self.analyzer.required_source_columns()
    }

    /// Builds the pipeline up to the target stage and returns its stream
    pub fn execute(self) -> QueryResult<BoxedStream> {
        let required = self.analyzer.required_source_columns();
        let source_header = self.analyzer.source_header().clone();

        let (mut streams, mut from_stage) = match &self.source {
            Source::Storage(storage) => {
                let scan = storage.read(&required, &self.query, &self.context, self.to_stage)?;
                if scan.stage > ProcessingStage::FetchColumns {
                    self.context.log(
                        Event::StageSkipped,
                        &[("stage", scan.stage.as_str()), ("table", storage.name())],
                    );
                }
                (scan.streams, scan.stage)
            }
            Source::Subquery(subquery) => {
                let nested = SelectInterpreter::with_required_columns(
                    subquery.clone(),
                    &self.context.nested(),
                    &required,
                    ProcessingStage::Complete,
                )?;
                (vec![nested.execute()?], ProcessingStage::FetchColumns)
            }
            Source::Input(_) | Source::Dummy => (Vec::new(), ProcessingStage::FetchColumns),
        };

        let SelectInterpreter {
            query,
            context,
            to_stage,
            source,
            analyzer,
            subqueries,
            branches,
            sample_block,
            table_lock,
        } = self;

        match source {
            Source::Input(input) => streams.push(input),
            Source::Dummy => streams.push(dummy_source()),
            Source::Storage(_) | Source::Subquery(_) => {}
        }
        if streams.is_empty() {
            streams.push(Box::new(BlocksSource::empty(source_header.clone())));
            from_stage = ProcessingStage::FetchColumns;
        }
        if from_stage == ProcessingStage::FetchColumns {
            streams = streams
                .into_iter()
                .map(|s| conform_by_name(s, &source_header))
                .collect::<QueryResult<_>>()?;
        }

        let pipeline = Pipeline {
            query: &query,
            analyzer: &analyzer,
            context: &context,
            to_stage,
        };
        let streams = pipeline.build(streams, from_stage)?;
        let stream_count = streams.len();
        let mut root = union_streams(streams);

        if !branches.is_empty() {
            let mut all = vec![root];
            for branch in branches {
                all.push(conform_by_position(branch.execute()?, &sample_block)?);
            }
            root = Box::new(UnionStream::new(all));
        }

        if !subqueries.is_empty() {
            let subqueries = subqueries
                .into_iter()
                .map(PlannedSubquerySet::execute)
                .collect::<QueryResult<Vec<_>>>()?;
            root = Box::new(CreatingSetsStream::new(root, subqueries, &context));
        }

        context.log(
            Event::SelectExecute,
            &[
                ("from_stage", from_stage.as_str()),
                ("streams", &stream_count.to_string()),
                ("to_stage", to_stage.as_str()),
            ],
        );

        Ok(Box::new(QueryStream {
            root,
            context,
            finished: false,
            _lock: table_lock,
        }))
    }

    /// Runs the query to completion, writing every block and the totals
    /// row to `sink`. Returns the exhausted stream for inspection.
    pub fn execute_and_format(self, sink: &mut dyn FormatSink) -> QueryResult<BoxedStream> {
        let mut stream = self.execute()?;
        copy_data(stream.as_mut(), sink)?;
        Ok(stream)
    }
}

/// Looks up the storage named in FROM, if any
fn resolve_storage(query: &SelectQuery, context: &Context) -> QueryResult<Option<Arc<dyn Storage>>> {
    match &query.from {
        None | Some(TableExpr::Subquery(_)) => Ok(None),
        Some(TableExpr::Join { .. }) => Err(QueryError::unsupported_join()),
        Some(TableExpr::Table { database, table }) => {
            let database = database.as_deref().unwrap_or(context.current_database());
            context.catalog().get(database, table).map(Some)
        }
        Some(TableExpr::Function { name, args }) => match name.as_str() {
            "numbers" => Ok(Some(Arc::new(NumbersTable::from_args(args)?))),
            other => Err(QueryError::invalid_table_function(format!(
                "Unknown table function {}",
                other
            ))),
        },
    }
}

fn check_union_structure(first: &Block, branch: &Block) -> QueryResult<()> {
    if first.num_columns() != branch.num_columns() {
        return Err(QueryError::union_mismatch(format!(
            "UNION ALL branches have {} and {} columns",
            first.num_columns(),
            branch.num_columns()
        )));
    }
    for (a, b) in first.columns().iter().zip(branch.columns()) {
        if a.data_type != b.data_type {
            return Err(QueryError::union_mismatch(format!(
                "Column {} is {} in the first branch and {} in another",
                a.name, a.data_type, b.data_type
            )));
        }
    }
    Ok(())
}

fn dummy_source() -> BoxedStream {
    let header = Block::header(&[ColumnDef::new(DUMMY_COLUMN, DataType::UInt8)]);
    let row = Block::new(vec![Column::new(DUMMY_COLUMN, DataType::UInt8, vec![Value::UInt(0)])]);
    Box::new(BlocksSource::new("Dummy", header, vec![row]))
}

/// Selects and orders the columns of `header` from a stream that may carry
/// more columns or a different order
fn conform_by_name(stream: BoxedStream, header: &Block) -> QueryResult<BoxedStream> {
    if stream.header().same_structure(header) {
        return Ok(stream);
    }
    let mut actions = ExpressionActions::new(stream.header());
    actions.project(header.names().into_iter().map(|n| (n.clone(), n)).collect())?;
    Ok(Box::new(ExpressionStream::with_label(stream, Arc::new(actions), "Conform")))
}

/// Renames the columns of a UNION ALL branch to those of the first branch
fn conform_by_position(stream: BoxedStream, header: &Block) -> QueryResult<BoxedStream> {
    if stream.header().same_structure(header) {
        return Ok(stream);
    }
    let mut actions = ExpressionActions::new(stream.header());
    actions.project(stream.header().names().into_iter().zip(header.names()).collect())?;
    Ok(Box::new(ExpressionStream::with_label(stream, Arc::new(actions), "Conform")))
}

/// The stream handed out by `execute`: holds the table lock for as long as
/// the pipeline lives and counts the blocks it produces
struct QueryStream {
    root: BoxedStream,
    context: Context,
    /// Exhausted or failed; either way not abandoned by the caller
    finished: bool,
    // released after `root`, so no operator outlives the lock
    _lock: Option<TableStructureReadLock>,
}

impl BlockStream for QueryStream {
    fn header(&self) -> &Block {
        self.root.header()
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        match self.root.read() {
            Ok(Some(block)) => {
                self.context.metrics().increment_blocks_produced();
                Ok(Some(block))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                self.context.log(
                    Event::StreamFailed,
                    &[("code", err.code().code()), ("reason", err.message())],
                );
                Err(err)
            }
        }
    }

    fn totals(&self) -> Option<Block> {
        self.root.totals()
    }

    fn explain(&self) -> PlanNode {
        self.root.explain()
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        if !self.finished {
            self.context
                .log(Event::StreamCancelled, &[("depth", &self.context.depth().to_string())]);
        }
    }
}
