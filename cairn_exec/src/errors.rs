use cairn::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Anything the storage engine surfaced, deadlock aborts included.
    #[error(transparent)]
    Storage(#[from] DbError),

    /// The operator was driven before `open` (or after `close`).
    #[error("operator is not open")]
    NotOpen,
}

pub type ExecResult<T> = Result<T, ExecutionError>;
