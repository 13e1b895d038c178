//! The storage-backend capability consumed by the buffer pool.

use crate::access::scan::TableScan;
use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::{Page, PageHandle, PageId};
use crate::transaction::TransactionId;

/// A table's backing store: a sequence of pages on durable storage plus the
/// tuple-level operations that know the page format.
///
/// The buffer pool only ever talks to tables through this trait. Tuple
/// operations receive the pool explicitly so they can fetch pages under the
/// calling transaction's locks.
pub trait DbFile: Send + Sync {
    fn id(&self) -> TableId;

    fn schema(&self) -> &Schema;

    fn page_size(&self) -> usize;

    /// Reads one whole page from storage, bypassing the cache.
    fn read_page(&self, page_id: PageId) -> StorageResult<Page>;

    /// Writes one whole page to storage.
    fn write_page(&self, page: &Page) -> StorageResult<()>;

    fn num_pages(&self) -> StorageResult<u32>;

    /// Places `tuple` in the table, setting its record id, and returns the
    /// pages the insertion modified.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageHandle>>;

    /// Removes the tuple at `tuple`'s record id and returns the pages modified.
    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageHandle>>;

    /// Decodes the live tuples of one of this table's pages.
    fn page_tuples(&self, page: &Page) -> StorageResult<Vec<Tuple>>;

    /// Opens a cursor over every tuple of the table.
    fn scan(&self, pool: &BufferPool, tid: TransactionId) -> StorageResult<TableScan> {
        let mut scan = TableScan::new(pool.clone(), self.id(), tid);
        scan.open()?;
        Ok(scan)
    }
}
