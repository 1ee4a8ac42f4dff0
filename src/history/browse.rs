use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::loader::{HistoryLoader, HistoryReader, HistoryWindow, MoreSignal};

/// Joins multiple selected entries.
pub const SELECTION_SEPARATOR: &str = " ";

/// Outcome of an interactive selection. Aborting is an ordinary result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(Vec<usize>),
    Aborted,
}

/// An interactive surface that picks entries out of a growing window.
///
/// It must re-read `window` on every pass so appended pages show up, and
/// calls `more` whenever it runs out of candidates.
pub trait Selector: Send + 'static {
    fn select(&mut self, window: &HistoryWindow, more: &MoreSignal) -> Result<Selection>;
}

/// Lets the user pick from history, loading older pages on demand.
///
/// Returns the chosen texts joined by [`SELECTION_SEPARATOR`], or an empty
/// string when the selection was aborted.
pub async fn browse_history<R, S>(reader: Arc<R>, mut selector: S, page_size: usize) -> Result<String>
where
    R: HistoryReader + 'static,
    S: Selector,
{
    let loader = HistoryLoader::start(reader, page_size, CancellationToken::new())
        .await
        .context("failed to load clipboard history")?;

    let window = loader.window();
    let more = loader
        .signal()
        .context("history loader has no request channel")?;

    // The selector blocks on terminal input; keep it off the async workers.
    let selection = tokio::task::spawn_blocking(move || selector.select(&window, &more))
        .await
        .context("selector task failed");

    let window = loader.finish().await;

    match selection?? {
        Selection::Aborted => Ok(String::new()),
        Selection::Selected(indices) => Ok(window.texts(&indices).join(SELECTION_SEPARATOR)),
    }
}
