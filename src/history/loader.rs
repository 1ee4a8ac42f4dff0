use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, HistoryEntry, StorageError};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Paged read access to stored history.
#[async_trait]
pub trait HistoryReader: Send + Sync {
    async fn read(&self, offset: usize, limit: usize) -> Result<Vec<HistoryEntry>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}

#[async_trait]
impl HistoryReader for Database {
    async fn read(&self, offset: usize, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        Database::read(self, offset, limit).await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Database::count(self).await
    }
}

/// The growing list of entries shown by the selector.
///
/// Readers hold the shared lock for a whole scan; the loader takes the
/// exclusive lock only to append a page it has already fetched.
#[derive(Clone, Default)]
pub struct HistoryWindow {
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl HistoryWindow {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<HistoryEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<HistoryEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(super) fn append(&self, page: Vec<HistoryEntry>) {
        self.write().extend(page);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Texts at `indices`, in the given order; out-of-range indices are skipped.
    pub fn texts(&self, indices: &[usize]) -> Vec<String> {
        let entries = self.read();
        indices
            .iter()
            .filter_map(|&i| entries.get(i).map(|entry| entry.text.clone()))
            .collect()
    }
}

/// Non-blocking "load the next page" request. Bursts coalesce into one.
#[derive(Clone)]
pub struct MoreSignal {
    pub(super) tx: mpsc::Sender<()>,
}

impl MoreSignal {
    /// Returns `false` when a request is already pending or the loader is gone.
    pub fn request(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Owns the background task that appends pages to a [`HistoryWindow`].
pub struct HistoryLoader {
    window: HistoryWindow,
    signal: Option<MoreSignal>,
    task: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    total: usize,
}

impl HistoryLoader {
    /// Loads the first page, snapshots the total and starts the page task.
    pub async fn start<R>(
        reader: Arc<R>,
        page_size: usize,
        cancel_token: CancellationToken,
    ) -> Result<Self, StorageError>
    where
        R: HistoryReader + 'static,
    {
        let page_size = page_size.max(1);
        let first_page = reader.read(0, page_size).await?;
        let total = reader.count().await?;
        let window = HistoryWindow::new(first_page);

        // Capacity 1: a pending request absorbs any burst behind it.
        let (more_tx, more_rx) = mpsc::channel(1);
        let task = tokio::spawn(load_pages(
            reader,
            window.clone(),
            more_rx,
            page_size,
            total,
            cancel_token.clone(),
        ));

        debug!(
            "history loader started: {} of {} entries loaded",
            window.len(),
            total
        );

        Ok(Self {
            window,
            signal: Some(MoreSignal { tx: more_tx }),
            task: Some(task),
            cancel_token,
            total,
        })
    }

    pub fn window(&self) -> HistoryWindow {
        self.window.clone()
    }

    /// A handle the selector can use to ask for more entries.
    pub fn signal(&self) -> Option<MoreSignal> {
        self.signal.clone()
    }

    pub fn request_more(&self) -> bool {
        self.signal.as_ref().is_some_and(MoreSignal::request)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Closes the request channel and waits briefly for the task to drain.
    ///
    /// Requests already queued are still served. If other [`MoreSignal`]
    /// clones keep the channel open past the grace period, the task is
    /// cancelled instead.
    pub async fn finish(mut self) -> HistoryWindow {
        self.signal = None;

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("history loader did not stop within {SHUTDOWN_GRACE:?}; cancelling");
                self.cancel_token.cancel();
                let _ = task.await;
            }
        }

        self.window.clone()
    }
}

impl Drop for HistoryLoader {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel_token.cancel();
            task.abort();
        }
    }
}

async fn load_pages<R: HistoryReader>(
    reader: Arc<R>,
    window: HistoryWindow,
    mut more_rx: mpsc::Receiver<()>,
    page_size: usize,
    total: usize,
    cancel_token: CancellationToken,
) {
    // The first page is already in the window.
    let mut offset = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            request = more_rx.recv() => {
                if request.is_none() {
                    break;
                }
                if offset >= total {
                    continue;
                }

                let next = offset + page_size;
                let page = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    page = reader.read(next, page_size) => page,
                };

                match page {
                    Ok(page) => {
                        offset = next;
                        if !page.is_empty() {
                            debug!("appending {} history entries at offset {next}", page.len());
                            window.append(page);
                        }
                    }
                    Err(err) => {
                        warn!(
                            "failed to load more history items (offset={next}, limit={page_size}, total={total}): {err}"
                        );
                    }
                }
            }
        }
    }

    debug!("history loader stopped at offset {offset}");
}
