use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer_pool::BufferPool;
use crate::error::DbResult;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique, monotonically increasing transaction identifier.
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
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The coordinator handle for one transaction. The storage core never decides
/// to commit or abort on its own; the holder of this handle does, including
/// after a `TransactionAborted` deadlock verdict.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flushes this transaction's dirty pages and releases its locks.
    pub fn commit(&self, buffer_pool: &BufferPool) -> DbResult<()> {
        buffer_pool.transaction_complete(self.id, true)
    }

    /// Reverts this transaction's in-memory changes and releases its locks.
    pub fn abort(&self, buffer_pool: &BufferPool) -> DbResult<()> {
        buffer_pool.transaction_complete(self.id, false)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
