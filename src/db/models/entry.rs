//! Clipboard history data model.

use chrono::{DateTime, Utc};

/// One stored clipboard text snapshot.
///
/// `captured_at` is the most recent time this content was observed; repeat
/// captures bump it instead of inserting a second row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub text: String,
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
}
