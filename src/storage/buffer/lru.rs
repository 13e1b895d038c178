use super::replacer::{Replacer, StampOrder};
use crate::storage::page::PageId;

/// Least-recently-used order: every hit makes a page the youngest.
#[derive(Debug, Default)]
pub struct LruReplacer {
    order: StampOrder,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for LruReplacer {
    fn record_insert(&mut self, page_id: PageId) {
        self.order.stamp(page_id);
    }

    fn record_access(&mut self, page_id: PageId) {
        self.order.stamp(page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        self.order.remove(page_id);
    }

    fn victim(&self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId> {
        self.order.first_matching(evictable)
    }

    fn size(&self) -> usize {
        self.order.len()
    }
}
