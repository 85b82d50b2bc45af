//! Input files for the CLI
//!
//! Catalog file:
//! ```json
//! {"database": "default",
//!  "tables": [{"name": "t",
//!              "columns": [{"name": "a", "type": "UInt64"}],
//!              "partitions": [[[1], [2]], [[3]]]}]}
//! ```
//! Each partition is a list of rows in column order. The query file holds
//! the JSON form of a `SelectQuery`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::block::{ColumnDef, Value};
use crate::interpreter::DEFAULT_DATABASE;
use crate::query::SelectQuery;
use crate::storage::{Catalog, MemoryTable};

use super::errors::{CliError, CliResult};

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default = "default_database")]
    pub database: String,
    pub tables: Vec<TableFile>,
}

#[derive(Debug, Deserialize)]
pub struct TableFile {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub partitions: Vec<Vec<Vec<Value>>>,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

impl CatalogFile {
    /// Builds a catalog of in-memory tables, one partition per entry
    pub fn into_catalog(self) -> CliResult<Catalog> {
        let catalog = Catalog::new();
        for table in self.tables {
            let memory = MemoryTable::new(table.name, table.columns);
            for partition in table.partitions {
                memory.insert_partition(partition)?;
            }
            catalog.attach(&self.database, Arc::new(memory))?;
        }
        Ok(catalog)
    }
}

/// Reads and builds the catalog file, returning it with its database name
pub fn load_catalog(path: &Path) -> CliResult<(Catalog, String)> {
    let file: CatalogFile = read_json(path)?;
    let database = file.database.clone();
    Ok((file.into_catalog()?, database))
}

pub fn load_query(path: &Path) -> CliResult<SelectQuery> {
    read_json(path)
}
