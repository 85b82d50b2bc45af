//! CLI command implementations

use std::io::{self, Write};
use std::sync::Arc;

use crate::config::Settings;
use crate::format::{FormatSink, JsonEachRow, TabSeparated};
use crate::interpreter::{Context, SelectInterpreter};
use crate::stream::ExplainPlan;

use super::args::{Cli, Command, OutputFormat, QueryInput};
use super::errors::CliResult;
use super::io::{load_catalog, load_query};

/// Parses the arguments and runs the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cmd {
        Command::Query { input, format } => query(&input, format, &mut out),
        Command::Explain { input } => explain(&input, &mut out),
    }
}

fn build_context(input: &QueryInput) -> CliResult<Context> {
    let settings = match &input.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let (catalog, database) = load_catalog(&input.catalog)?;
    Ok(Context::new(settings, Arc::new(catalog)).with_database(database))
}

/// Runs the query and writes the result in `format`
pub fn query(input: &QueryInput, format: OutputFormat, out: &mut dyn Write) -> CliResult<()> {
    let context = build_context(input)?;
    let query = load_query(&input.query)?;
    let interpreter = SelectInterpreter::new(query, &context, input.stage.into())?;

    let mut sink: Box<dyn FormatSink + '_> = match format {
        OutputFormat::Tsv => Box::new(TabSeparated::new(&mut *out)),
        OutputFormat::TsvWithNames => Box::new(TabSeparated::with_names(&mut *out)),
        OutputFormat::JsonEachRow => Box::new(JsonEachRow::new(&mut *out)),
    };
    interpreter.execute_and_format(sink.as_mut())?;
    Ok(())
}

/// Writes the realized operator tree, or why the query was rejected
pub fn explain(input: &QueryInput, out: &mut dyn Write) -> CliResult<()> {
    let context = build_context(input)?;
    let query = load_query(&input.query)?;
    let plan = match SelectInterpreter::new(query, &context, input.stage.into())
        .and_then(|interpreter| interpreter.execute())
    {
        Ok(stream) => ExplainPlan::from_stream(stream.as_ref()),
        Err(err) => ExplainPlan::from_error(&err),
    };
    write!(out, "{}", plan)?;
    out.flush()?;
    Ok(())
}
