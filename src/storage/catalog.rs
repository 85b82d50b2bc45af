//! Registry of tables by database and name

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{QueryError, QueryResult};

use super::Storage;

#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<(String, String), Arc<dyn Storage>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any previous table of that name
    pub fn attach(&self, database: &str, table: Arc<dyn Storage>) -> QueryResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        tables.insert((database.to_string(), table.name().to_string()), table);
        Ok(())
    }

    pub fn get(&self, database: &str, table: &str) -> QueryResult<Arc<dyn Storage>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| QueryError::unknown_table(database, table))
    }

    /// Drops a table. Fails while any query holds a read lock on it.
    pub fn detach(&self, database: &str, table: &str) -> QueryResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        let key = (database.to_string(), table.to_string());
        let storage = tables
            .get(&key)
            .ok_or_else(|| QueryError::unknown_table(database, table))?;
        storage.structure().drop_table()?;
        tables.remove(&key);
        Ok(())
    }

    /// `database.table` names in sorted order
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .map(|t| t.keys().map(|(db, name)| format!("{}.{}", db, name)).collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ColumnDef, DataType};
    use crate::error::QueryErrorCode;
    use crate::storage::MemoryTable;

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        let table = MemoryTable::new("t", vec![ColumnDef::new("a", DataType::UInt64)]);
        catalog.attach("default", Arc::new(table)).unwrap();
        catalog
    }

    #[test]
    fn test_get_unknown_table() {
        let err = catalog().get("default", "missing").err().unwrap();
        assert_eq!(err.code(), QueryErrorCode::UnknownTable);
        assert_eq!(catalog().table_names(), vec!["default.t"]);
    }

    #[test]
    fn test_detach_rejected_while_locked() {
        let catalog = catalog();
        let table = catalog.get("default", "t").unwrap();
        let lock = table.lock_structure().unwrap();
        let err = catalog.detach("default", "t").unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TableStructureLocked);

        drop(lock);
        catalog.detach("default", "t").unwrap();
        assert!(catalog.get("default", "t").is_err());
        let err = table.lock_structure().unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TableDropped);
    }
}
