//! CLI module for stagedb
//!
//! Provides command-line interface for:
//! - query: run a query over a catalog file
//! - explain: print the operator tree of a query

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, OutputFormat, QueryInput, StageArg};
pub use commands::{explain, query, run, run_command};
pub use errors::{CliError, CliResult};
pub use io::{load_catalog, load_query, CatalogFile, TableFile};
