//! Transaction management module.
//!
//! This module provides transaction support for heapdb:
//! - Transaction ids, unique for the lifetime of the process
//! - Transaction lifecycle (begin, commit, abort) through RAII handles
//! - Transaction state tracking

pub mod id;
pub mod manager;
pub mod state;

// Re-export commonly used types
pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::{Transaction, TransactionManager};
pub use state::TransactionState;
