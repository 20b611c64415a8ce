//! The table catalog: table id to heap file, schema and name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{DbError, DbResult};
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use crate::TableId;

struct CatalogEntry {
    file: Arc<HeapFile>,
    name: String,
}

/// Maps catalog-assigned table ids to their heap files. Shared across every
/// transaction; never a process-wide global.
pub struct Catalog {
    tables: RwLock<HashMap<TableId, CatalogEntry>>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_table_id: AtomicU32::new(0),
        }
    }

    /// Vends a fresh table id for a heap file about to be opened.
    pub fn next_table_id(&self) -> TableId {
        self.next_table_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers a table. Re-adding a name or id replaces the old binding.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str) {
        let mut tables = self.tables.write().unwrap();
        tables.retain(|_, entry| entry.name != name);
        tables.insert(
            file.table_id(),
            CatalogEntry {
                file,
                name: name.to_string(),
            },
        );
    }

    pub fn heap_file(&self, table_id: TableId) -> DbResult<Arc<HeapFile>> {
        let tables = self.tables.read().unwrap();
        tables
            .get(&table_id)
            .map(|entry| entry.file.clone())
            .ok_or_else(|| DbError::InvalidArgument(format!("unknown table id {table_id}")))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> DbResult<Arc<TupleDesc>> {
        Ok(self.heap_file(table_id)?.tuple_desc().clone())
    }

    pub fn table_name(&self, table_id: TableId) -> DbResult<String> {
        let tables = self.tables.read().unwrap();
        tables
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| DbError::InvalidArgument(format!("unknown table id {table_id}")))
    }

    pub fn table_id_for(&self, name: &str) -> Option<TableId> {
        let tables = self.tables.read().unwrap();
        tables
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(&id, _)| id)
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let tables = self.tables.read().unwrap();
        tables.keys().copied().collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
