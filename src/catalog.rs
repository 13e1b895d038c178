//! Registry of the tables a database knows about.

use crate::access::{DbFile, HeapFile, Schema};
use crate::storage::error::{StorageError, StorageResult};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableId = u32;

struct TableEntry {
    name: String,
    file: Arc<dyn DbFile>,
}

/// Maps table ids to their storage backends, schemas and names.
///
/// The catalog lives in memory only and is handed to the buffer pool
/// explicitly; it is not persisted.
pub struct Catalog {
    tables: RwLock<HashMap<TableId, TableEntry>>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Reserves a fresh table id.
    pub fn next_table_id(&self) -> TableId {
        self.next_table_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Opens (or creates) a heap file at `path` and registers it under `name`.
    pub fn create_table(
        &self,
        name: &str,
        path: &Path,
        schema: Schema,
        page_size: usize,
    ) -> StorageResult<TableId> {
        let table_id = self.next_table_id();
        let file = HeapFile::open(table_id, path, schema, page_size)?;
        self.add_table(name, Arc::new(file))
    }

    /// Registers `file` under `name`. A table already registered under the
    /// same name or id is replaced.
    pub fn add_table(&self, name: &str, file: Arc<dyn DbFile>) -> StorageResult<TableId> {
        if name.is_empty() {
            return Err(StorageError::invalid("table name must not be empty"));
        }

        let table_id = file.id();
        self.next_table_id
            .fetch_max(table_id.saturating_add(1), Ordering::SeqCst);

        let mut tables = self.tables.write();
        tables.retain(|_, entry| entry.name != name);
        tables.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file,
            },
        );
        debug!("registered table '{}' as {}", name, table_id);
        Ok(table_id)
    }

    pub fn file(&self, table_id: TableId) -> StorageResult<Arc<dyn DbFile>> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or_else(|| unknown_table(table_id))
    }

    pub fn schema(&self, table_id: TableId) -> StorageResult<Schema> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.file.schema().clone())
            .ok_or_else(|| unknown_table(table_id))
    }

    pub fn table_name(&self, table_id: TableId) -> StorageResult<String> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| unknown_table(table_id))
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(&id, _)| id)
    }

    /// All registered ids, ascending.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_table(table_id: TableId) -> StorageError {
    StorageError::invalid(format!("table {} does not exist", table_id))
}
