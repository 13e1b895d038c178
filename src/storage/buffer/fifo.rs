use super::replacer::{Replacer, StampOrder};
use crate::storage::page::PageId;

/// Admission order: pages leave in the order they entered, hits are ignored.
#[derive(Debug, Default)]
pub struct FifoReplacer {
    order: StampOrder,
}

impl FifoReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for FifoReplacer {
    fn record_insert(&mut self, page_id: PageId) {
        if !self.order.contains(page_id) {
            self.order.stamp(page_id);
        }
    }

    fn record_access(&mut self, _page_id: PageId) {}

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
