mod loop_worker;
mod watcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{Database, StorageError};

pub use loop_worker::run_capture;
pub use watcher::{ClipboardReader, ClipboardWatcher, SystemClipboard, POLL_INTERVAL};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to initialize clipboard: {0}")]
    Source(String),

    #[error("failed to persist clipboard entry: {0}")]
    Storage(#[from] StorageError),
}

/// Sink for captured payloads. The capture loop owns it and closes it once on exit.
#[async_trait]
pub trait HistoryWriter: Send + Sync {
    async fn write(&self, payload: &[u8]) -> Result<(), StorageError>;

    fn close(&self);
}

#[async_trait]
impl HistoryWriter for Database {
    async fn write(&self, payload: &[u8]) -> Result<(), StorageError> {
        Database::write(self, payload).await
    }

    fn close(&self) {
        Database::close(self);
    }
}
