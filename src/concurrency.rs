//! Concurrency control module.
//!
//! Transactions are serialized by strict two-phase locking on whole pages:
//! shared locks for reads, exclusive locks for writes, all held until the
//! transaction completes. Waits that would deadlock abort the requester.

pub mod lock;

pub use lock::{AbortReason, LockManager, LockMode, TransactionAborted};
