use crate::storage::page::PageId;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// Orders resident pages for eviction.
///
/// The replacer only ranks pages; the buffer pool decides which of them may
/// actually leave (clean pages only) through the `evictable` predicate.
pub trait Replacer: Send + Sync + Debug {
    /// A page was admitted into the pool.
    fn record_insert(&mut self, page_id: PageId);

    /// A resident page was requested again.
    fn record_access(&mut self, page_id: PageId);

    /// A page left the pool.
    fn remove(&mut self, page_id: PageId);

    /// The first page in eviction order accepted by `evictable`.
    fn victim(&self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId>;

    /// Number of pages tracked.
    fn size(&self) -> usize;
}

/// Pages ranked by a logical timestamp, oldest first.
#[derive(Debug, Default)]
pub(super) struct StampOrder {
    order: BTreeMap<u64, PageId>,
    stamps: HashMap<PageId, u64>,
    clock: u64,
}

impl StampOrder {
    /// Moves `page_id` to the young end, inserting it if absent.
    pub(super) fn stamp(&mut self, page_id: PageId) {
        self.clock += 1;
        if let Some(old) = self.stamps.insert(page_id, self.clock) {
            self.order.remove(&old);
        }
        self.order.insert(self.clock, page_id);
    }

    pub(super) fn contains(&self, page_id: PageId) -> bool {
        self.stamps.contains_key(&page_id)
    }

    pub(super) fn remove(&mut self, page_id: PageId) {
        if let Some(stamp) = self.stamps.remove(&page_id) {
            self.order.remove(&stamp);
        }
    }

    pub(super) fn first_matching(&self, pred: &dyn Fn(&PageId) -> bool) -> Option<PageId> {
        self.order.values().find(|page_id| pred(page_id)).copied()
    }

    pub(super) fn len(&self) -> usize {
        self.stamps.len()
    }
}
