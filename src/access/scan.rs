//! Sequential table scanning.

use crate::access::file::DbFile;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Cursor over every live tuple of a table, in page then slot order.
///
/// Pages are fetched lazily under a shared lock for the scanning
/// transaction, one page at a time. The page count is re-read whenever the
/// cursor moves to a new page, so pages appended by the same transaction
/// during the scan are visited.
///
/// A cursor must be opened before it yields anything; a closed cursor is an
/// exhausted iterator.
pub struct TableScan {
    pool: BufferPool,
    table_id: TableId,
    tid: TransactionId,
    file: Option<Arc<dyn DbFile>>,
    next_page: u32,
    buffered: VecDeque<Tuple>,
}

impl TableScan {
    pub fn new(pool: BufferPool, table_id: TableId, tid: TransactionId) -> Self {
        Self {
            pool,
            table_id,
            tid,
            file: None,
            next_page: 0,
            buffered: VecDeque::new(),
        }
    }

    /// Resolves the table and positions the cursor before the first tuple.
    pub fn open(&mut self) -> StorageResult<()> {
        let file = self.pool.catalog().file(self.table_id)?;
        self.file = Some(file);
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    /// Drops the cursor's position. Page locks stay with the transaction.
    pub fn close(&mut self) {
        self.file = None;
        self.next_page = 0;
        self.buffered.clear();
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    // Loads pages until one with live tuples is found. Ok(false) at the end.
    fn fill(&mut self) -> StorageResult<bool> {
        let Some(file) = self.file.as_ref().map(Arc::clone) else {
            return Ok(false);
        };

        while self.buffered.is_empty() {
            if self.next_page >= file.num_pages()? {
                return Ok(false);
            }
            let page_id = PageId::new(self.table_id, self.next_page);
            self.next_page += 1;

            let handle = self.pool.fetch_page(self.tid, page_id, LockMode::Shared)?;
            let tuples = file.page_tuples(&handle.read())?;
            self.buffered.extend(tuples);
        }
        Ok(true)
    }
}

impl Iterator for TableScan {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() {
            match self.fill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}
