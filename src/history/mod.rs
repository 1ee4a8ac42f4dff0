mod browse;
mod loader;
pub mod picker;

pub use browse::{browse_history, Selection, Selector, SELECTION_SEPARATOR};
pub use loader::{HistoryLoader, HistoryReader, HistoryWindow, MoreSignal};
pub use picker::TerminalPicker;
