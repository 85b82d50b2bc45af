//! CLI-specific error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::QueryError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Query(#[from] QueryError),
}

impl CliError {
    /// Stable code for scripts that parse stderr
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Io(_) => "STAGE_CLI_IO_ERROR",
            CliError::Json { .. } => "STAGE_CLI_JSON_ERROR",
            CliError::Config(_) => "STAGE_CLI_CONFIG_ERROR",
            CliError::Query(err) => err.code().code(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
