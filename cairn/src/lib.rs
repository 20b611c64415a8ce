//! # Cairn Storage Engine
//! Transactional storage core for a small relational database: paged heap
//! files, a locking buffer pool with NO-STEAL/FORCE semantics, and the
//! write-ahead log boundary consumed at commit.

/// The buffer pool manager and page permissions.
pub mod buffer_pool;
/// The table catalog.
pub mod catalog;
/// Explicit assembly of catalog, buffer pool and log.
pub mod db;
/// Error types shared across the engine.
pub mod error;
/// Failpoints for fault-injection tests.
pub mod failpoint;
/// Heap files and their page-ordered iterators.
pub mod heap_file;
/// The lock manager for page-level two-phase locking.
pub mod lock_manager;
/// The slotted heap page layout.
pub mod page;
/// Transaction identifiers and the thin transaction handle.
pub mod transaction;
/// Tuples, fields and schema descriptors.
pub mod tuple;
/// The Write-Ahead Log boundary.
pub mod wal;

use std::sync::atomic::{AtomicUsize, Ordering};

/// A catalog-assigned identifier for a table.
pub type TableId = u32;

/// A page address: which table, and which page within that table's file.
/// Page numbers are contiguous from zero.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

/// Bytes per page unless overridden before any file is opened.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// The size of a single page in bytes.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Overrides the page size. Must be called before any heap file is opened;
/// intended for tests only.
pub fn set_page_size(bytes: usize) {
    PAGE_SIZE.store(bytes, Ordering::Relaxed);
}

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("CAIRN_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! cairn_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}

pub use buffer_pool::{BufferPool, PageRef, Permission};
pub use error::{DbError, DbResult};
pub use page::HeapPage;
pub use transaction::{Transaction, TransactionId};
pub use tuple::{Field, FieldType, RecordId, Tuple, TupleDesc};
