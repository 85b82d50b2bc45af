//! Table structure locks
//!
//! Every running query holds a read lock on each table it reads. Structural
//! changes (adding a column, detaching the table) need the table to have no
//! readers and fail immediately otherwise; they never wait.

use std::sync::{Arc, Mutex};

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    dropped: bool,
}

/// Reader count and dropped flag of one table
#[derive(Debug)]
pub struct TableLocks {
    name: String,
    state: Mutex<LockState>,
}

impl TableLocks {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(LockState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes a read lock. Fails once the table has been dropped.
    pub fn lock_for_read(self: &Arc<Self>) -> QueryResult<TableStructureReadLock> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        if state.dropped {
            return Err(QueryError::table_dropped(&self.name));
        }
        state.readers += 1;
        Ok(TableStructureReadLock {
            inner: Arc::new(ReadGuard {
                locks: Arc::clone(self),
            }),
        })
    }

    pub fn readers(&self) -> usize {
        self.state.lock().map(|s| s.readers).unwrap_or(0)
    }

    pub fn is_dropped(&self) -> bool {
        self.state.lock().map(|s| s.dropped).unwrap_or(true)
    }

    /// Runs a structural change while no reader holds the table
    pub fn alter<T>(&self, change: impl FnOnce() -> T) -> QueryResult<T> {
        let state = self
            .state
            .lock()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        if state.dropped {
            return Err(QueryError::table_dropped(&self.name));
        }
        if state.readers > 0 {
            return Err(QueryError::table_structure_locked(&self.name, state.readers));
        }
        // the state stays locked so no reader can slip in during the change
        Ok(change())
    }

    /// Marks the table dropped. Later read locks fail.
    pub fn drop_table(&self) -> QueryResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueryError::execution_failed("Lock poisoned"))?;
        if state.readers > 0 {
            return Err(QueryError::table_structure_locked(&self.name, state.readers));
        }
        state.dropped = true;
        Ok(())
    }
}

#[derive(Debug)]
struct ReadGuard {
    locks: Arc<TableLocks>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.locks.state.lock() {
            state.readers = state.readers.saturating_sub(1);
        }
    }
}

/// Shared read lock on a table's structure, released when the last clone
/// is dropped
#[derive(Debug, Clone)]
pub struct TableStructureReadLock {
    inner: Arc<ReadGuard>,
}

impl TableStructureReadLock {
    pub fn table(&self) -> &str {
        self.inner.locks.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorCode;

    #[test]
    fn test_alter_rejected_while_read_locked() {
        let locks = TableLocks::new("hits");
        let lock = locks.lock_for_read().unwrap();
        let copy = lock.clone();
        assert_eq!(locks.readers(), 1);

        let err = locks.alter(|| ()).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TableStructureLocked);

        drop(lock);
        assert!(locks.alter(|| ()).is_err());
        drop(copy);
        assert_eq!(locks.readers(), 0);
        assert!(locks.alter(|| ()).is_ok());
    }

    #[test]
    fn test_dropped_table_cannot_be_locked() {
        let locks = TableLocks::new("hits");
        locks.drop_table().unwrap();
        let err = locks.lock_for_read().unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::TableDropped);
        assert_eq!(err.severity(), crate::error::Severity::Fatal);
    }
}
