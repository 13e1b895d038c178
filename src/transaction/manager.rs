use crate::access::{RecordId, TableScan, Tuple};
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageHandle, PageId};
use crate::transaction::id::{TransactionId, TransactionIdGenerator};
use crate::transaction::state::TransactionState;
use log::{debug, error};

/// Hands out transactions bound to one buffer pool.
pub struct TransactionManager {
    pool: BufferPool,
    ids: TransactionIdGenerator,
}

impl TransactionManager {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            ids: TransactionIdGenerator::new(),
        }
    }

    /// Starts a new transaction with a fresh id.
    pub fn begin(&self) -> Transaction {
        Transaction::begin(self.pool.clone(), self.ids.next())
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }
}

/// A running transaction. Every page it touches stays locked until it
/// commits or aborts; a handle dropped while still active is aborted.
pub struct Transaction {
    id: TransactionId,
    pool: BufferPool,
    state: TransactionState,
}

impl Transaction {
    pub fn begin(pool: BufferPool, id: TransactionId) -> Self {
        debug!("{} began", id);
        Self {
            id,
            pool,
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn fetch_page(&self, page_id: PageId, mode: LockMode) -> StorageResult<PageHandle> {
        self.pool.fetch_page(self.id, page_id, mode)
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> StorageResult<RecordId> {
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> StorageResult<()> {
        self.pool.delete_tuple(self.id, tuple)
    }

    /// Opens a cursor over `table_id` that reads under this transaction.
    pub fn scan(&self, table_id: TableId) -> StorageResult<TableScan> {
        let mut scan = TableScan::new(self.pool.clone(), table_id, self.id);
        scan.open()?;
        Ok(scan)
    }

    /// Flushes every page this transaction dirtied and releases its locks.
    pub fn commit(mut self) -> StorageResult<()> {
        self.complete(true)
    }

    /// Reverts every page this transaction dirtied and releases its locks.
    pub fn abort(mut self) -> StorageResult<()> {
        self.complete(false)
    }

    fn complete(&mut self, commit: bool) -> StorageResult<()> {
        if !self.state.is_active() {
            return Err(StorageError::invalid(format!(
                "{} is already {}",
                self.id, self.state
            )));
        }
        let result = self.pool.transaction_complete(self.id, commit);
        self.state = if commit && result.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            if let Err(e) = self.complete(false) {
                error!("abort of dropped {} failed: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Schema, Value};
    use crate::catalog::Catalog;
    use crate::config::StorageConfig;
    use anyhow::Result;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn setup() -> Result<(TempDir, TransactionManager, TableId)> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.create_table(
            "t",
            &dir.path().join("t.dat"),
            Schema::from_types(&[DataType::Int32]),
            4096,
        )?;
        let pool = BufferPool::new(catalog, &StorageConfig::default());
        Ok((dir, TransactionManager::new(pool), table_id))
    }

    fn row(v: i32) -> Tuple {
        Tuple::new(vec![Value::Int32(v)])
    }

    fn count(manager: &TransactionManager, table_id: TableId) -> Result<usize> {
        let txn = manager.begin();
        let n = txn.scan(table_id)?.count();
        txn.commit()?;
        Ok(n)
    }

    #[test]
    fn test_ids_are_unique() -> Result<()> {
        let (_dir, manager, _) = setup()?;
        let a = manager.begin();
        let b = manager.begin();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), TransactionState::Active);
        Ok(())
    }

    #[test]
    fn test_commit_keeps_changes() -> Result<()> {
        let (_dir, manager, table_id) = setup()?;

        let txn = manager.begin();
        let rid = txn.insert_tuple(table_id, &mut row(1))?;
        let id = txn.id();
        txn.commit()?;

        assert!(!manager.buffer_pool().holds_lock(id, rid.page_id));
        assert_eq!(count(&manager, table_id)?, 1);
        Ok(())
    }

    #[test]
    fn test_abort_discards_changes() -> Result<()> {
        let (_dir, manager, table_id) = setup()?;

        let txn = manager.begin();
        txn.insert_tuple(table_id, &mut row(1))?;
        txn.abort()?;

        assert_eq!(count(&manager, table_id)?, 0);
        Ok(())
    }

    #[test]
    fn test_drop_aborts_active_transaction() -> Result<()> {
        let (_dir, manager, table_id) = setup()?;

        let rid = {
            let txn = manager.begin();
            txn.insert_tuple(table_id, &mut row(1))?
        };

        // The dropped transaction's lock is gone and its insert undone.
        assert_eq!(manager.buffer_pool().lock_manager().lock_mode(rid.page_id), None);
        assert_eq!(count(&manager, table_id)?, 0);
        Ok(())
    }
}
