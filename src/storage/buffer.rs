pub mod fifo;
pub mod lru;
pub mod replacer;

use crate::access::{DbFile, RecordId, Tuple};
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::config::{ReplacementPolicy, StorageConfig};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageHandle, PageId};
use crate::transaction::TransactionId;
use dashmap::DashMap;
use fifo::FifoReplacer;
use log::{debug, error, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::sync::Arc;

/// The bounded page cache every page access goes through.
///
/// Fetching a page first takes the requested lock for the transaction, so a
/// returned handle may be read (shared) or written (exclusive) accordingly.
/// Dirty pages are never evicted: uncommitted bytes only ever live in the
/// pool, and reach disk when their transaction commits.
///
/// Cloning is cheap and every clone shares the same cache.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    page_table: DashMap<PageId, PageHandle>,
    // Also serializes admission and eviction so the pool never overfills.
    replacer: Mutex<Box<dyn Replacer>>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: &StorageConfig) -> Self {
        let replacer: Box<dyn Replacer> = match config.replacement {
            ReplacementPolicy::Lru => Box::new(LruReplacer::new()),
            ReplacementPolicy::Fifo => Box::new(FifoReplacer::new()),
        };
        Self::with_parts(
            catalog,
            replacer,
            LockManager::with_timeout(config.lock_timeout),
            config.pool_capacity,
        )
    }

    pub fn with_parts(
        catalog: Arc<Catalog>,
        replacer: Box<dyn Replacer>,
        lock_manager: LockManager,
        capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                page_table: DashMap::with_capacity(capacity),
                replacer: Mutex::new(replacer),
                lock_manager,
                catalog,
                capacity,
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.inner.page_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.page_table.is_empty()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.page_table.contains_key(&page_id)
    }

    /// Ids of all resident pages, ascending.
    pub fn resident_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self.inner.page_table.iter().map(|e| *e.key()).collect();
        pages.sort_unstable();
        pages
    }

    /// Locks `page_id` for `tid` in `mode` and returns the page, loading it
    /// from its table's file if it is not resident.
    ///
    /// Blocks while another transaction holds a conflicting lock. Fails with
    /// [`StorageError::Aborted`] if waiting would deadlock, and with
    /// [`StorageError::BufferPoolFull`] if the page must be loaded but no
    /// resident page can be evicted. That is the case when every resident
    /// page is dirty, and also, transiently, when the only clean ones are
    /// write-locked by a caller holding their guard at that moment.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> StorageResult<PageHandle> {
        let file = self.inner.catalog.file(page_id.table_id)?;
        if !self.is_resident(page_id) && page_id.page_number >= file.num_pages()? {
            return Err(StorageError::invalid(format!(
                "{} is beyond the end of table {}",
                page_id, page_id.table_id
            )));
        }

        self.inner.lock_manager.acquire(tid, page_id, mode)?;

        if let Some(handle) = self.lookup(page_id) {
            return Ok(handle);
        }
        self.load_page(file.as_ref(), page_id)
    }

    /// Gives back `tid`'s lock on `page_id` before the transaction ends.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.holds(tid, page_id)
    }

    /// Inserts `tuple` into `table_id` on behalf of `tid` and returns where
    /// it was placed. The tuple's record id is set as well.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<RecordId> {
        let file = self.inner.catalog.file(table_id)?;
        for handle in file.insert_tuple(self, tid, tuple)? {
            self.mark_dirty(tid, &handle)?;
        }
        tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("insert did not place the tuple"))
    }

    /// Deletes the tuple at `tuple`'s record id on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::invalid("tuple has no record id"))?;
        let file = self.inner.catalog.file(record_id.page_id.table_id)?;
        for handle in file.delete_tuple(self, tid, tuple)? {
            self.mark_dirty(tid, &handle)?;
        }
        Ok(())
    }

    /// Records that `tid` modified the page behind `handle` and makes sure
    /// that copy is the resident one. Callers that write to a fetched page
    /// directly must call this afterwards.
    pub fn mark_dirty(&self, tid: TransactionId, handle: &PageHandle) -> StorageResult<()> {
        let page_id = {
            let mut page = handle.write();
            page.mark_dirty(tid);
            page.id()
        };
        self.inner.lock_manager.record_dirtied(tid, page_id);
        self.install(page_id, handle)
    }

    /// Ends `tid`. On commit every page it dirtied is written out; on abort
    /// those pages are reloaded from disk, discarding its changes. All of
    /// its locks are released either way, even if the flush or reload fails.
    ///
    /// A page that could not be flushed or reloaded is dropped from the
    /// cache before the locks go, so no other transaction ever sees bytes
    /// that did not reach disk.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let mut pages: Vec<PageId> = self
            .inner
            .lock_manager
            .dirtied_pages_of(tid)
            .into_iter()
            .collect();
        pages.sort_unstable();

        let result = if commit {
            self.commit_pages(tid, &pages)
        } else {
            self.abort_pages(&pages)
        };
        if let Err(e) = &result {
            error!(
                "{} of {} failed: {}",
                if commit { "commit" } else { "abort" },
                tid,
                e
            );
        }

        self.inner.lock_manager.release_all(tid);
        debug!(
            "{} {} ({} dirty pages)",
            tid,
            if commit { "committed" } else { "aborted" },
            pages.len()
        );
        result
    }

    /// Writes `page_id` to disk if it is resident and dirty. Locks are not
    /// touched.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let Some(handle) = self.lookup_quiet(page_id) else {
            return Ok(());
        };
        let file = self.inner.catalog.file(page_id.table_id)?;

        let mut page = handle.write();
        if page.is_dirty() {
            file.write_page(&page)?;
            page.mark_clean();
            debug!("flushed {}", page_id);
        }
        Ok(())
    }

    /// Writes every dirty resident page to disk.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        self.resident_pages()
            .into_iter()
            .try_for_each(|page_id| self.flush_page(page_id))
    }

    /// Writes the resident pages dirtied by `tid` to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let mut pages: Vec<PageId> = self
            .inner
            .lock_manager
            .dirtied_pages_of(tid)
            .into_iter()
            .collect();
        pages.sort_unstable();
        pages
            .into_iter()
            .try_for_each(|page_id| self.flush_page(page_id))
    }

    /// Drops `page_id` from the cache without writing it, dirty or not.
    pub fn discard_page(&self, page_id: PageId) {
        let mut replacer = self.inner.replacer.lock();
        if self.inner.page_table.remove(&page_id).is_some() {
            replacer.remove(page_id);
            debug!("discarded {}", page_id);
        }
    }

    // Resident handle, counted as an access.
    fn lookup(&self, page_id: PageId) -> Option<PageHandle> {
        let mut replacer = self.inner.replacer.lock();
        let handle = self.lookup_quiet(page_id)?;
        replacer.record_access(page_id);
        Some(handle)
    }

    fn lookup_quiet(&self, page_id: PageId) -> Option<PageHandle> {
        self.inner
            .page_table
            .get(&page_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn load_page(&self, file: &dyn DbFile, page_id: PageId) -> StorageResult<PageHandle> {
        let mut replacer = self.inner.replacer.lock();

        // Someone else may have loaded it while we waited.
        if let Some(handle) = self.lookup_quiet(page_id) {
            replacer.record_access(page_id);
            return Ok(handle);
        }

        if self.inner.page_table.len() >= self.inner.capacity {
            self.evict_page(&mut **replacer)?;
        }

        let handle = Arc::new(RwLock::new(file.read_page(page_id)?));
        self.inner.page_table.insert(page_id, Arc::clone(&handle));
        replacer.record_insert(page_id);
        debug!("loaded {}", page_id);
        Ok(handle)
    }

    // Makes `handle` the resident copy of `page_id`, admitting it if needed.
    fn install(&self, page_id: PageId, handle: &PageHandle) -> StorageResult<()> {
        let mut replacer = self.inner.replacer.lock();

        let resident = self
            .inner
            .page_table
            .get(&page_id)
            .map(|entry| Arc::ptr_eq(entry.value(), handle));
        match resident {
            Some(true) => replacer.record_access(page_id),
            Some(false) => {
                self.inner.page_table.insert(page_id, Arc::clone(handle));
                replacer.record_access(page_id);
            }
            None => {
                if self.inner.page_table.len() >= self.inner.capacity {
                    self.evict_page(&mut **replacer)?;
                }
                self.inner.page_table.insert(page_id, Arc::clone(handle));
                replacer.record_insert(page_id);
            }
        }
        Ok(())
    }

    // Removes the first clean page in replacement order. Pages currently
    // being written are passed over; dirty pages are never chosen.
    fn evict_page(&self, replacer: &mut dyn Replacer) -> StorageResult<()> {
        let page_table = &self.inner.page_table;
        let victim = replacer.victim(&|page_id| {
            page_table.get(page_id).is_some_and(|entry| {
                entry
                    .value()
                    .try_read()
                    .is_some_and(|page| !page.is_dirty())
            })
        });

        match victim {
            Some(page_id) => {
                page_table.remove(&page_id);
                replacer.remove(page_id);
                debug!("evicted {}", page_id);
                Ok(())
            }
            None => {
                warn!(
                    "buffer pool full: no clean, unlocked page among {} resident",
                    self.inner.capacity
                );
                Err(StorageError::BufferPoolFull {
                    capacity: self.inner.capacity,
                })
            }
        }
    }

    // Flushes `pages` in order. After the first failure, every page `tid`
    // still has dirty in the cache is dropped, so the cache matches disk.
    fn commit_pages(&self, tid: TransactionId, pages: &[PageId]) -> StorageResult<()> {
        let result = pages.iter().try_for_each(|&page_id| self.flush_page(page_id));
        if result.is_err() {
            for &page_id in pages {
                let unflushed = self
                    .lookup_quiet(page_id)
                    .is_some_and(|handle| handle.read().dirtier() == Some(tid));
                if unflushed {
                    self.discard_page(page_id);
                }
            }
        }
        result
    }

    // Reverts every page, dropping the ones that cannot be reloaded. Dirty
    // pages are never evicted, so a dropped page reloads its last committed
    // bytes later. Returns the first failure.
    fn abort_pages(&self, pages: &[PageId]) -> StorageResult<()> {
        let mut result = Ok(());
        for &page_id in pages {
            if let Err(e) = self.revert_page(page_id) {
                warn!("could not reload {}, dropping it: {}", page_id, e);
                self.discard_page(page_id);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    // Replaces the resident copy's bytes with what is on disk. A page that
    // is no longer resident already matches disk.
    fn revert_page(&self, page_id: PageId) -> StorageResult<()> {
        let Some(handle) = self.lookup_quiet(page_id) else {
            return Ok(());
        };
        let fresh: Page = self
            .inner
            .catalog
            .file(page_id.table_id)?
            .read_page(page_id)?;
        handle.write().restore_from(fresh);
        debug!("reverted {}", page_id);
        Ok(())
    }
}
