//! Explicit assembly of the engine's three shared collaborators: the catalog,
//! the buffer pool and the write-ahead log. They are carried together as one
//! value and threaded into whatever embeds the engine; there is no process
//! global.

use std::path::Path;
use std::sync::Arc;

use crate::buffer_pool::{BufferPool, DEFAULT_PAGES};
use crate::catalog::Catalog;
use crate::error::DbResult;
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use crate::wal::WalManager;

pub struct Database {
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
    log: Arc<WalManager>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(log_path: P) -> DbResult<Self> {
        Self::with_pool_capacity(DEFAULT_PAGES, log_path)
    }

    pub fn with_pool_capacity<P: AsRef<Path>>(capacity: usize, log_path: P) -> DbResult<Self> {
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(WalManager::open(log_path)?);
        let buffer_pool = Arc::new(BufferPool::with_capacity(
            capacity,
            catalog.clone(),
            log.clone(),
        ));
        Ok(Self {
            catalog,
            buffer_pool,
            log,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn log(&self) -> &Arc<WalManager> {
        &self.log
    }

    /// Opens a heap file under a fresh catalog-assigned id and registers it.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        desc: TupleDesc,
    ) -> DbResult<Arc<HeapFile>> {
        let table_id = self.catalog.next_table_id();
        let file = Arc::new(HeapFile::open(path, table_id, Arc::new(desc))?);
        self.catalog.add_table(file.clone(), name);
        Ok(file)
    }
}
