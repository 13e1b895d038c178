//! Runtime settings for the storage engine.

use crate::storage::disk::DEFAULT_PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of pages the buffer pool may hold.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Order in which the buffer pool considers clean pages for eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Fifo,
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Lru => write!(f, "lru"),
            ReplacementPolicy::Fifo => write!(f, "fifo"),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(ReplacementPolicy::Lru),
            "fifo" => Ok(ReplacementPolicy::Fifo),
            other => Err(StorageError::invalid(format!(
                "unknown replacement policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bytes per page, shared by every table of a database.
    pub page_size: usize,
    /// Maximum number of resident pages.
    pub pool_capacity: usize,
    pub replacement: ReplacementPolicy,
    /// Upper bound on any single lock wait. `None` waits until granted or
    /// chosen as a deadlock victim.
    pub lock_timeout: Option<Duration>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_capacity: DEFAULT_POOL_PAGES,
            replacement: ReplacementPolicy::default(),
            lock_timeout: None,
        }
    }
}

impl StorageConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn with_replacement(mut self, replacement: ReplacementPolicy) -> Self {
        self.replacement = replacement;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Rejects settings no table could work with. Whether a page fits at
    /// least one tuple is checked per schema when a table is created.
    pub fn validate(&self) -> StorageResult<()> {
        if self.page_size == 0 {
            return Err(StorageError::invalid("page size must be positive"));
        }
        if self.pool_capacity == 0 {
            return Err(StorageError::invalid("buffer pool capacity must be positive"));
        }
        if self.lock_timeout == Some(Duration::ZERO) {
            return Err(StorageError::invalid("lock timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.pool_capacity, DEFAULT_POOL_PAGES);
        assert_eq!(config.replacement, ReplacementPolicy::Lru);
        assert_eq!(config.lock_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_degenerate_settings() {
        assert!(StorageConfig::default().with_pool_capacity(0).validate().is_err());
        assert!(StorageConfig::default().with_page_size(0).validate().is_err());
        assert!(StorageConfig::default()
            .with_lock_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("LRU".parse::<ReplacementPolicy>().ok(), Some(ReplacementPolicy::Lru));
        assert_eq!("fifo".parse::<ReplacementPolicy>().ok(), Some(ReplacementPolicy::Fifo));
        assert!("clock".parse::<ReplacementPolicy>().is_err());
        assert_eq!(ReplacementPolicy::Fifo.to_string(), "fifo");
    }
}
