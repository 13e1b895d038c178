//! Storage layer error types.

use crate::catalog::TableId;
use crate::concurrency::lock::TransactionAborted;
use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// Ordinary failures are reported through the plain variants and leave the
/// transaction usable. [`StorageError::Aborted`] is different: it carries the
/// lock manager's abort signal and must be propagated back to whoever owns the
/// transaction, which then completes it with `commit = false`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tuple belongs to table {found}, not table {expected}")]
    WrongTable { expected: TableId, found: TableId },

    #[error("Tuple does not match schema: {0}")]
    SchemaMismatch(String),

    #[error("Tuple not found: slot {slot} of {page_id} is empty")]
    TupleNotFound { page_id: PageId, slot: u16 },

    #[error("Insertion into {page_id} failed: no free slot")]
    InsertionFailed { page_id: PageId },

    #[error("Buffer pool is full: none of its {capacity} resident pages can be evicted")]
    BufferPoolFull { capacity: usize },

    #[error(transparent)]
    Aborted(#[from] TransactionAborted),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if this error is the lock manager's abort signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::Aborted(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StorageError::InvalidRequest(msg.into())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::lock::AbortReason;
    use crate::transaction::TransactionId;

    #[test]
    fn test_abort_is_distinguishable() {
        let aborted: StorageError = TransactionAborted {
            tid: TransactionId::new(7),
            page_id: PageId::new(1, 0),
            reason: AbortReason::Deadlock,
        }
        .into();
        assert!(aborted.is_abort());
        assert!(aborted.to_string().contains("Txn7"));

        let invalid = StorageError::invalid("bad page");
        assert!(!invalid.is_abort());
        assert_eq!(invalid.to_string(), "Invalid request: bad page");
    }

    #[test]
    fn test_io_error_conversion() {
        fn fails() -> StorageResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
