//! Access layer for tuple-oriented operations.
//!
//! This module provides the record-level view of tables:
//!
//! - **Value / DataType**: fixed-width column values and their encoding
//! - **Schema**: ordered, typed fields describing a tuple
//! - **Tuple / RecordId**: a row and the (page, slot) it lives at
//! - **DbFile**: the storage-backend trait the buffer pool talks to
//! - **HeapFile**: unordered tables stored as bitmap-slotted heap pages
//! - **TableScan**: a lazy, transaction-scoped cursor over a table

pub mod file;
pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use file::DbFile;
pub use heap::HeapFile;
pub use scan::TableScan;
pub use schema::{Field, Schema};
pub use tuple::{RecordId, Tuple};
pub use value::{DataType, Value, STRING_LEN};
