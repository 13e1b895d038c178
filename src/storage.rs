//! Storage layer implementation for heapdb.
//!
//! This module provides the foundation for persistent data storage using a page-based
//! architecture. Key components:
//!
//! - **Page**: fixed-size blocks of data, the basic unit of I/O and locking
//! - **PageManager**: handles reading/writing whole pages of one table's extent
//! - **BufferPool**: bounded in-memory cache of pages that never evicts dirty pages
//! - **HeapPage**: bitmap-slotted page format for fixed-width tuples
//!
//! There is no write-ahead log. A transaction's writes stay in the buffer pool
//! until it commits, at which point its pages are written out.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::BufferPool;
pub use disk::{PageManager, DEFAULT_PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, HeapPageLayout, Page, PageHandle, PageId};
