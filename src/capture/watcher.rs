use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::CaptureError;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CHANNEL_CAPACITY: usize = 64;

/// Read side of a clipboard.
pub trait ClipboardReader {
    /// Current clipboard text, or `None` when it holds no text.
    fn read_text(&mut self) -> Option<String>;
}

pub struct SystemClipboard {
    clipboard: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, CaptureError> {
        arboard::Clipboard::new()
            .map(|clipboard| Self { clipboard })
            .map_err(|err| CaptureError::Source(err.to_string()))
    }
}

impl ClipboardReader for SystemClipboard {
    fn read_text(&mut self) -> Option<String> {
        self.clipboard.get_text().ok()
    }
}

/// Polls a clipboard on a blocking task and emits each new text value.
///
/// Whatever the clipboard holds at startup is not emitted. The payload
/// channel closes once the watcher stops.
pub struct ClipboardWatcher {
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl ClipboardWatcher {
    pub async fn start(
        cancel_token: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Vec<u8>>), CaptureError> {
        Self::start_with(cancel_token, POLL_INTERVAL, SystemClipboard::new).await
    }

    /// Starts polling a reader built by `factory` on the watcher thread.
    pub async fn start_with<R, F>(
        cancel_token: CancellationToken,
        interval: Duration,
        factory: F,
    ) -> Result<(Self, mpsc::Receiver<Vec<u8>>), CaptureError>
    where
        R: ClipboardReader,
        F: FnOnce() -> Result<R, CaptureError> + Send + 'static,
    {
        let (payload_tx, payload_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let token = cancel_token.clone();

        let handle = tokio::task::spawn_blocking(move || {
            // Some platform clipboards must stay on the thread that opened them.
            let reader = match factory() {
                Ok(reader) => reader,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            poll_clipboard(reader, payload_tx, token, interval);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.await;
                return Err(err);
            }
            Err(_) => {
                return Err(CaptureError::Source(
                    "clipboard watcher exited before initialization".into(),
                ))
            }
        }

        info!("clipboard watcher started (poll every {}ms)", interval.as_millis());

        Ok((
            Self {
                handle: Some(handle),
                cancel_token,
            },
            payload_rx,
        ))
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("clipboard watcher task failed to join")
        } else {
            Ok(())
        }
    }
}

fn poll_clipboard<R: ClipboardReader>(
    mut reader: R,
    payload_tx: mpsc::Sender<Vec<u8>>,
    cancel_token: CancellationToken,
    interval: Duration,
) {
    let mut last = reader.read_text();

    while !cancel_token.is_cancelled() {
        std::thread::sleep(interval);
        if cancel_token.is_cancelled() {
            break;
        }

        match reader.read_text() {
            Some(text) if last.as_deref() != Some(text.as_str()) => {
                if payload_tx.blocking_send(text.as_bytes().to_vec()).is_err() {
                    debug!("capture loop dropped the payload channel");
                    break;
                }
                last = Some(text);
            }
            _ => {}
        }
    }

    info!("clipboard watcher shutting down");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Plays back a script of clipboard states, then repeats the final one.
    struct ScriptedClipboard {
        script: Arc<Mutex<VecDeque<Option<String>>>>,
        current: Option<String>,
    }

    impl ClipboardReader for ScriptedClipboard {
        fn read_text(&mut self) -> Option<String> {
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                self.current = next;
            }
            self.current.clone()
        }
    }

    fn scripted(states: &[Option<&str>]) -> ScriptedClipboard {
        ScriptedClipboard {
            script: Arc::new(Mutex::new(
                states.iter().map(|s| s.map(str::to_string)).collect(),
            )),
            current: None,
        }
    }

    #[tokio::test]
    async fn emits_only_changes_after_startup() {
        let token = CancellationToken::new();
        let reader = scripted(&[
            Some("startup"),
            Some("startup"),
            Some("first"),
            None,
            Some("first"),
            Some("second"),
        ]);

        let (mut watcher, mut rx) =
            ClipboardWatcher::start_with(token.clone(), Duration::from_millis(2), move || Ok(reader))
                .await
                .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, b"first".to_vec());
        assert_eq!(second, b"second".to_vec());

        watcher.stop().await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn initialization_failure_is_reported() {
        let result = ClipboardWatcher::start_with(
            CancellationToken::new(),
            Duration::from_millis(2),
            || -> Result<ScriptedClipboard, CaptureError> {
                Err(CaptureError::Source("no display".into()))
            },
        )
        .await;

        assert!(matches!(result, Err(CaptureError::Source(msg)) if msg == "no display"));
    }

    #[tokio::test]
    async fn cancellation_closes_payload_channel() {
        let token = CancellationToken::new();
        let reader = scripted(&[Some("steady")]);
        let (_watcher, mut rx) =
            ClipboardWatcher::start_with(token.clone(), Duration::from_millis(2), move || Ok(reader))
                .await
                .unwrap();

        token.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("watcher did not stop after cancellation");
        assert!(closed.is_none());
    }
}
