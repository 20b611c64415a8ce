use std::io;
use thiserror::Error;

/// Errors surfaced by the storage engine. Nothing is retried internally;
/// the transaction coordinator decides whether to commit or abort after one
/// of these propagates.
#[derive(Debug, Error)]
pub enum DbError {
    /// The requesting transaction was chosen as a deadlock victim. The
    /// coordinator must respond by aborting the transaction.
    #[error("transaction aborted")]
    TransactionAborted,

    /// A storage-level contract violation: all-dirty eviction failure,
    /// schema mismatch on insert, missing page on flush.
    #[error("{0}")]
    Db(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed request: read past end of file, unsupported aggregate over
    /// strings, out-of-range page offset.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type DbResult<T> = Result<T, DbError>;
