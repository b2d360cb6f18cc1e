//! Engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// SQLite rejected the statement or the load.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("table has no columns")]
    NoColumns,

    #[error("query timed out after {0}ms")]
    Timeout(u64),

    #[error("connection lock poisoned")]
    Poisoned,

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
