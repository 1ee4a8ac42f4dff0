use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CaptureError, HistoryWriter};

/// Persists every payload from `source` until cancelled or the source closes.
///
/// Both of those endings are clean. The first failed write ends the loop with
/// that error; nothing is retried. `writer` is closed exactly once on the way out.
pub async fn run_capture<W: HistoryWriter>(
    writer: W,
    mut source: mpsc::Receiver<Vec<u8>>,
    cancel_token: CancellationToken,
) -> Result<(), CaptureError> {
    let mut captured: u64 = 0;

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("capture loop shutting down after {captured} entries");
                break Ok(());
            }
            item = source.recv() => {
                let Some(payload) = item else {
                    info!("clipboard source closed after {captured} entries");
                    break Ok(());
                };

                if let Err(err) = writer.write(&payload).await {
                    error!("failed to persist clipboard entry ({} bytes): {err}", payload.len());
                    break Err(CaptureError::Storage(err));
                }
                captured += 1;
            }
        }
    };

    writer.close();
    result
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::db::StorageError;

    #[derive(Clone, Default)]
    struct RecordingWriter {
        items: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_on_call: Option<usize>,
        calls: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl RecordingWriter {
        fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::default()
            }
        }

        fn items(&self) -> Vec<Vec<u8>> {
            self.items.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HistoryWriter for RecordingWriter {
        async fn write(&self, payload: &[u8]) -> Result<(), StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(StorageError::Value("disk full".into()));
            }
            self.items.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn capture_closed(writer: RecordingWriter, items: Vec<Vec<u8>>) -> Result<(), CaptureError> {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.unwrap();
        }
        drop(tx);
        run_capture(writer, rx, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn forwards_items_in_order_until_source_closes() {
        let writer = RecordingWriter::default();
        let items = vec![b"item1".to_vec(), b"item2".to_vec(), b"item3".to_vec()];

        capture_closed(writer.clone(), items.clone()).await.unwrap();

        assert_eq!(writer.items(), items);
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_and_large_payloads_pass_through() {
        let writer = RecordingWriter::default();
        let items = vec![Vec::new(), vec![0u8; 100_000]];

        capture_closed(writer.clone(), items).await.unwrap();

        let written = writer.items();
        assert_eq!(written.len(), 2);
        assert!(written[0].is_empty());
        assert_eq!(written[1].len(), 100_000);
    }

    #[tokio::test]
    async fn cancellation_returns_without_error() {
        let writer = RecordingWriter::default();
        let (_tx, rx) = mpsc::channel::<Vec<u8>>(1);
        let token = CancellationToken::new();

        let task = tokio::spawn(run_capture(writer.clone(), rx, token.clone()));
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("capture loop did not stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_does_not_drain_pending_items() {
        let writer = RecordingWriter::default();
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        tx.send(b"before-cancel".to_vec()).await.unwrap();
        let task = tokio::spawn(run_capture(writer.clone(), rx, token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let _ = tx.send(b"after-cancel".to_vec()).await;

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("capture loop did not stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(writer.items(), vec![b"before-cancel".to_vec()]);
    }

    #[tokio::test]
    async fn write_failure_stops_the_loop() {
        let writer = RecordingWriter::failing_on(2);
        let items = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];

        let err = capture_closed(writer.clone(), items).await.unwrap_err();

        assert!(matches!(err, CaptureError::Storage(StorageError::Value(_))));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(writer.items(), vec![b"first".to_vec()]);
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn captures_into_real_store_with_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::db::Database::open(dir.path().join("history.db")).unwrap();
        let observer = db.clone();
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(run_capture(db, rx, CancellationToken::new()));
        for payload in [&b"alpha"[..], b"beta", b"alpha"] {
            tx.send(payload.to_vec()).await.unwrap();
        }
        drop(tx);
        task.await.unwrap().unwrap();

        // The loop closed the shared store on exit.
        assert!(matches!(observer.count().await, Err(StorageError::Closed)));

        let reopened = crate::db::Database::open(dir.path().join("history.db")).unwrap();
        let texts: Vec<String> = reopened
            .read(0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.text)
            .collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&"alpha".to_string()));
        assert!(texts.contains(&"beta".to_string()));
    }
}
