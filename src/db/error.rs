use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the history store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to prepare database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn database worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("{op} failed: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid stored value: {0}")]
    Value(String),

    #[error("database is closed")]
    Closed,

    #[error("database worker terminated unexpectedly")]
    WorkerGone,
}

/// Attaches the failing operation name to a raw SQLite error.
pub(crate) trait QueryContext<T> {
    fn op(self, op: &'static str) -> Result<T, StorageError>;
}

impl<T> QueryContext<T> for Result<T, rusqlite::Error> {
    fn op(self, op: &'static str) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::Query { op, source })
    }
}
