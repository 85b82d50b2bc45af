//! CLI argument definitions using clap
//!
//! Commands:
//! - stagedb query --catalog <path> --query <path>
//! - stagedb explain --catalog <path> --query <path>

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::interpreter::ProcessingStage;

/// stagedb - staged SELECT execution over in-memory tables
#[derive(Parser, Debug)]
#[command(name = "stagedb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query and write its result to stdout
    Query {
        #[command(flatten)]
        input: QueryInput,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
        format: OutputFormat,
    },

    /// Print the operator tree a query would run
    Explain {
        #[command(flatten)]
        input: QueryInput,
    },
}

/// Files every command reads
#[derive(Args, Debug, Clone)]
pub struct QueryInput {
    /// Tables to query, as JSON
    #[arg(long)]
    pub catalog: PathBuf,

    /// The query tree, as JSON
    #[arg(long)]
    pub query: PathBuf,

    /// Settings file; defaults apply when omitted
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Stage to stop at
    #[arg(long, value_enum, default_value_t = StageArg::Complete)]
    pub stage: StageArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tsv,
    TsvWithNames,
    JsonEachRow,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageArg {
    FetchColumns,
    WithMergeableState,
    Complete,
}

impl From<StageArg> for ProcessingStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::FetchColumns => ProcessingStage::FetchColumns,
            StageArg::WithMergeableState => ProcessingStage::WithMergeableState,
            StageArg::Complete => ProcessingStage::Complete,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
