//! On-disk extents.

pub mod page_manager;

pub use page_manager::{PageManager, DEFAULT_PAGE_SIZE};
