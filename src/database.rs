use crate::access::Schema;
use crate::catalog::{Catalog, TableId};
use crate::config::StorageConfig;
use crate::storage::buffer::BufferPool;
use crate::storage::error::{StorageError, StorageResult};
use crate::transaction::{Transaction, TransactionManager};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// High-level database interface that integrates all layers
///
/// Each table is stored in its own `<name>.dat` file under the data
/// directory. Reopening a database and creating a table with an existing
/// name picks up that file's contents.
pub struct Database {
    data_dir: PathBuf,
    config: StorageConfig,
    catalog: Arc<Catalog>,
    transactions: TransactionManager,
}

impl Database {
    /// Opens the database rooted at `data_dir`, creating the directory if
    /// needed.
    pub fn open(data_dir: &Path, config: StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(data_dir)?;

        let catalog = Arc::new(Catalog::new());
        let pool = BufferPool::new(Arc::clone(&catalog), &config);
        info!(
            "opened database at {} ({} pages of {} bytes, {} replacement)",
            data_dir.display(),
            config.pool_capacity,
            config.page_size,
            config.replacement
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            catalog,
            transactions: TransactionManager::new(pool),
        })
    }

    /// Creates the table `name`, or reopens it if its file already exists.
    pub fn create_table(&self, name: &str, schema: Schema) -> StorageResult<TableId> {
        if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\' || c == '.') {
            return Err(StorageError::invalid(format!(
                "'{}' is not a valid table name",
                name
            )));
        }
        if self.catalog.table_id(name).is_some() {
            return Err(StorageError::invalid(format!(
                "table '{}' already exists",
                name
            )));
        }

        let path = self.data_dir.join(format!("{}.dat", name));
        self.catalog
            .create_table(name, &path, schema, self.config.page_size)
    }

    pub fn table_id(&self, name: &str) -> StorageResult<TableId> {
        self.catalog
            .table_id(name)
            .ok_or_else(|| StorageError::invalid(format!("table '{}' does not exist", name)))
    }

    /// Names of all tables, in id order.
    pub fn list_tables(&self) -> StorageResult<Vec<String>> {
        self.catalog
            .table_ids()
            .into_iter()
            .map(|id| self.catalog.table_name(id))
            .collect()
    }

    /// Starts a transaction.
    pub fn begin(&self) -> Transaction {
        self.transactions.begin()
    }

    /// Writes every dirty resident page to disk.
    pub fn flush(&self) -> StorageResult<()> {
        self.buffer_pool().flush_all_pages()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        self.transactions.buffer_pool()
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
