use crate::access::file::DbFile;
use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, HeapPageLayout, Page, PageHandle, PageId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::Path;

/// An unordered table stored as a flat extent of bitmap-slotted heap pages.
///
/// The page count is derived from the extent length; there is no directory
/// page. Inserts fill the first page with a free slot and append a new page
/// only when every existing page is full.
pub struct HeapFile {
    table_id: TableId,
    schema: Schema,
    layout: HeapPageLayout,
    pages: Mutex<PageManager>,
    // Serializes extent growth so concurrent appenders get distinct pages.
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Creates an empty heap file at `path`, truncating any existing file.
    pub fn create(
        table_id: TableId,
        path: &Path,
        schema: Schema,
        page_size: usize,
    ) -> StorageResult<Self> {
        let layout = HeapPageLayout::new(page_size, schema.width())?;
        let pages = PageManager::create(path, page_size)?;
        Ok(Self::with_pages(table_id, pages, schema, layout))
    }

    /// Opens the heap file at `path`, creating it empty if it is missing.
    pub fn open(
        table_id: TableId,
        path: &Path,
        schema: Schema,
        page_size: usize,
    ) -> StorageResult<Self> {
        let layout = HeapPageLayout::new(page_size, schema.width())?;
        let pages = PageManager::open_or_create(path, page_size)?;
        Ok(Self::with_pages(table_id, pages, schema, layout))
    }

    fn with_pages(
        table_id: TableId,
        pages: PageManager,
        schema: Schema,
        layout: HeapPageLayout,
    ) -> Self {
        Self {
            table_id,
            schema,
            layout,
            pages: Mutex::new(pages),
            append_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &HeapPageLayout {
        &self.layout
    }

    fn check_owner(&self, page_id: PageId) -> StorageResult<()> {
        if page_id.table_id != self.table_id {
            return Err(StorageError::invalid(format!(
                "{} does not belong to table {}",
                page_id, self.table_id
            )));
        }
        Ok(())
    }

    fn has_free_slot(&self, page: &Page) -> bool {
        HeapPage::new(page.id(), &self.layout, &self.schema, page.data())
            .first_free_slot()
            .is_some()
    }

    fn insert_into(
        &self,
        handle: &PageHandle,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<()> {
        let mut page = handle.write();
        let page_id = page.id();
        let slot =
            HeapPage::new(page_id, &self.layout, &self.schema, page.data_mut()).insert_tuple(tuple)?;
        page.mark_dirty(tid);
        tuple.set_record_id(Some(RecordId::new(page_id, slot)));
        Ok(())
    }

    /// Grows the extent by one zeroed page and returns it exclusively locked
    /// by `tid`. The lock is taken before the page becomes visible, so no
    /// other transaction can slip in between the append and the insert.
    fn append_page(&self, pool: &BufferPool, tid: TransactionId) -> StorageResult<PageHandle> {
        let page_id = {
            let _append = self.append_lock.lock();
            let page_id = PageId::new(self.table_id, self.num_pages()?);
            pool.lock_manager()
                .acquire(tid, page_id, LockMode::Exclusive)?;
            // Appends are serialized, so the new page lands at `page_id`.
            if let Err(e) = self.pages.lock().allocate_page() {
                pool.release_page(tid, page_id);
                return Err(e);
            }
            page_id
        };

        debug!("{} appended {}", tid, page_id);
        pool.fetch_page(tid, page_id, LockMode::Exclusive)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.table_id
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn page_size(&self) -> usize {
        self.layout.page_size()
    }

    fn read_page(&self, page_id: PageId) -> StorageResult<Page> {
        self.check_owner(page_id)?;
        let mut data = vec![0u8; self.layout.page_size()];
        self.pages.lock().read_page(page_id.page_number, &mut data)?;
        Ok(Page::new(page_id, data))
    }

    fn write_page(&self, page: &Page) -> StorageResult<()> {
        self.check_owner(page.id())?;
        self.pages
            .lock()
            .write_page(page.id().page_number, page.data())
    }

    fn num_pages(&self) -> StorageResult<u32> {
        self.pages.lock().num_pages()
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageHandle>> {
        self.schema.check(tuple.values())?;

        for page_number in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_number);
            let held_before = pool.holds_lock(tid, page_id);

            let handle = pool.fetch_page(tid, page_id, LockMode::Shared)?;
            let has_room = self.has_free_slot(&handle.read());
            if !has_room {
                // Only give back locks this scan took; earlier reads by the
                // same transaction must stay protected.
                if !held_before {
                    pool.release_page(tid, page_id);
                }
                continue;
            }

            let handle = pool.fetch_page(tid, page_id, LockMode::Exclusive)?;
            self.insert_into(&handle, tid, tuple)?;
            return Ok(vec![handle]);
        }

        let handle = self.append_page(pool, tid)?;
        self.insert_into(&handle, tid, tuple)?;
        Ok(vec![handle])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageHandle>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("tuple has no record id"))?;
        if record_id.page_id.table_id != self.table_id {
            return Err(StorageError::WrongTable {
                expected: self.table_id,
                found: record_id.page_id.table_id,
            });
        }

        let handle = pool.fetch_page(tid, record_id.page_id, LockMode::Exclusive)?;
        {
            let mut page = handle.write();
            HeapPage::new(
                record_id.page_id,
                &self.layout,
                &self.schema,
                page.data_mut(),
            )
            .clear_slot(record_id.slot)?;
            page.mark_dirty(tid);
        }
        Ok(vec![handle])
    }

    fn page_tuples(&self, page: &Page) -> StorageResult<Vec<Tuple>> {
        self.check_owner(page.id())?;
        HeapPage::new(page.id(), &self.layout, &self.schema, page.data()).tuples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::catalog::Catalog;
    use crate::config::StorageConfig;
    use anyhow::Result;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    // 4-byte tuples in a 64-byte page: 15 slots per page.
    const PAGE: usize = 64;

    struct Fixture {
        _dir: TempDir,
        pool: BufferPool,
        table_id: TableId,
        file: Arc<dyn DbFile>,
        path: std::path::PathBuf,
    }

    fn fixture(capacity: usize) -> Result<Fixture> {
        let dir = tempdir()?;
        let path = dir.path().join("heap.dat");
        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.create_table(
            "numbers",
            &path,
            Schema::from_types(&[DataType::Int32]),
            PAGE,
        )?;
        let config = StorageConfig::default()
            .with_page_size(PAGE)
            .with_pool_capacity(capacity);
        let pool = BufferPool::new(Arc::clone(&catalog), &config);
        let file = catalog.file(table_id)?;
        Ok(Fixture {
            _dir: dir,
            pool,
            table_id,
            file,
            path,
        })
    }

    fn int(v: i32) -> Tuple {
        Tuple::new(vec![Value::Int32(v)])
    }

    fn scan_all(f: &Fixture, tid: TransactionId) -> Result<Vec<Tuple>> {
        Ok(f.file.scan(&f.pool, tid)?.collect::<StorageResult<Vec<_>>>()?)
    }

    #[test]
    fn test_first_insert_creates_one_page() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);
        assert_eq!(f.file.num_pages()?, 0);

        let mut tuple = int(42);
        let dirtied = f.file.insert_tuple(&f.pool, tid, &mut tuple)?;

        assert_eq!(dirtied.len(), 1);
        assert_eq!(f.file.num_pages()?, 1);
        assert_eq!(std::fs::metadata(&f.path)?.len(), PAGE as u64);
        assert_eq!(
            tuple.record_id(),
            Some(RecordId::new(PageId::new(f.table_id, 0), 0))
        );
        assert!(f.pool.holds_lock(tid, PageId::new(f.table_id, 0)));
        Ok(())
    }

    #[test]
    fn test_full_page_spills_to_next() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);
        let slots = f.file.page_size() * 8 / (4 * 8 + 1);
        assert_eq!(slots, 15);

        for v in 0..slots as i32 {
            let mut tuple = int(v);
            f.file.insert_tuple(&f.pool, tid, &mut tuple)?;
            assert_eq!(tuple.record_id().map(|r| r.page_id.page_number), Some(0));
        }
        assert_eq!(f.file.num_pages()?, 1);

        let mut tuple = int(100);
        f.file.insert_tuple(&f.pool, tid, &mut tuple)?;
        assert_eq!(
            tuple.record_id(),
            Some(RecordId::new(PageId::new(f.table_id, 1), 0))
        );
        assert_eq!(f.file.num_pages()?, 2);
        Ok(())
    }

    #[test]
    fn test_insert_reuses_freed_slot() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);

        let mut tuples: Vec<_> = (0..3).map(int).collect();
        for tuple in &mut tuples {
            f.file.insert_tuple(&f.pool, tid, tuple)?;
        }
        f.file.delete_tuple(&f.pool, tid, &tuples[0])?;

        let mut again = int(7);
        f.file.insert_tuple(&f.pool, tid, &mut again)?;
        assert_eq!(again.record_id().map(|r| r.slot), Some(0));
        Ok(())
    }

    #[test]
    fn test_delete_hides_tuple_from_scan() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);

        let mut keep = int(1);
        let mut gone = int(2);
        f.file.insert_tuple(&f.pool, tid, &mut keep)?;
        f.file.insert_tuple(&f.pool, tid, &mut gone)?;
        assert_eq!(scan_all(&f, tid)?, vec![int(1), int(2)]);

        f.file.delete_tuple(&f.pool, tid, &gone)?;
        assert_eq!(scan_all(&f, tid)?, vec![int(1)]);

        // Deleting again finds an empty slot.
        assert!(matches!(
            f.file.delete_tuple(&f.pool, tid, &gone),
            Err(StorageError::TupleNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_delete_from_wrong_table() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);
        let stray = int(5).with_record_id(RecordId::new(PageId::new(f.table_id + 1, 0), 0));

        assert!(matches!(
            f.file.delete_tuple(&f.pool, tid, &stray),
            Err(StorageError::WrongTable { expected, found })
                if expected == f.table_id && found == f.table_id + 1
        ));
        assert!(matches!(
            f.file.delete_tuple(&f.pool, tid, &int(5)),
            Err(StorageError::InvalidRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn test_insert_rejects_wrong_schema() -> Result<()> {
        let f = fixture(10)?;
        let mut bad = Tuple::new(vec![Value::String("nope".to_string())]);
        assert!(matches!(
            f.file.insert_tuple(&f.pool, TransactionId::new(1), &mut bad),
            Err(StorageError::SchemaMismatch(_))
        ));
        assert_eq!(f.file.num_pages()?, 0);
        Ok(())
    }

    #[test]
    fn test_full_pages_are_unlocked_during_insert() -> Result<()> {
        let f = fixture(10)?;
        let writer = TransactionId::new(1);
        for v in 0..15 {
            f.file.insert_tuple(&f.pool, writer, &mut int(v))?;
        }
        f.pool.transaction_complete(writer, true)?;

        let inserter = TransactionId::new(2);
        f.file.insert_tuple(&f.pool, inserter, &mut int(99))?;
        assert!(!f.pool.holds_lock(inserter, PageId::new(f.table_id, 0)));
        assert!(f.pool.holds_lock(inserter, PageId::new(f.table_id, 1)));
        Ok(())
    }

    #[test]
    fn test_page_read_write_round_trip() -> Result<()> {
        let f = fixture(10)?;
        let tid = TransactionId::new(1);
        for v in 0..4 {
            f.file.insert_tuple(&f.pool, tid, &mut int(v))?;
        }
        f.pool.transaction_complete(tid, true)?;

        let pid = PageId::new(f.table_id, 0);
        let before = std::fs::read(&f.path)?;
        let page = f.file.read_page(pid)?;
        f.file.write_page(&page)?;
        assert_eq!(std::fs::read(&f.path)?, before);
        assert_eq!(f.file.page_tuples(&page)?, (0..4).map(int).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_foreign_page_rejected() -> Result<()> {
        let f = fixture(10)?;
        let foreign = PageId::new(f.table_id + 7, 0);
        assert!(matches!(
            f.file.read_page(foreign),
            Err(StorageError::InvalidRequest(_))
        ));
        assert!(f.file.write_page(&Page::empty(foreign, PAGE)).is_err());
        Ok(())
    }
}
