pub mod heap_page;

use crate::catalog::TableId;
use crate::transaction::TransactionId;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Identity of one fixed-size page: the owning table and its position in the
/// table's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}:{}", self.table_id, self.page_number)
    }
}

/// Shared handle to the single live copy of a resident page.
pub type PageHandle = Arc<RwLock<Page>>;

/// A page-sized byte buffer plus the bookkeeping the buffer pool needs.
///
/// `before_image` always holds the bytes the page had when it was last clean
/// (loaded, flushed or reverted), so a dirty page can be compared against or
/// restored to its pre-transaction state.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
    dirtier: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl Page {
    /// Wraps bytes read from disk. The page starts clean.
    pub fn new(id: PageId, data: Vec<u8>) -> Self {
        let before_image = data.clone();
        Self {
            id,
            data,
            dirtier: None,
            before_image,
        }
    }

    /// A zero-filled page, the on-disk form of a freshly appended heap page.
    pub fn empty(id: PageId, page_size: usize) -> Self {
        Self::new(id, vec![0u8; page_size])
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The transaction that dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    pub fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirtier = Some(tid);
    }

    /// Records the current bytes as the last clean state.
    pub fn mark_clean(&mut self) {
        self.dirtier = None;
        self.before_image.copy_from_slice(&self.data);
    }

    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Replaces this page's contents with `fresh`, leaving it clean.
    pub fn restore_from(&mut self, fresh: Page) {
        debug_assert_eq!(self.id, fresh.id);
        *self = fresh;
    }
}

pub use heap_page::{HeapPage, HeapPageLayout};
