use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    error::{QueryContext, StorageError},
    helpers::{content_hash, format_timestamp, parse_datetime, to_i64, to_usize},
    models::HistoryEntry,
};

fn row_to_entry(row: &Row) -> Result<HistoryEntry, StorageError> {
    let captured_at: String = row.get("captured_at")?;

    Ok(HistoryEntry {
        id: row.get("id")?,
        text: row.get("clip_text")?,
        content_hash: row.get("text_hash")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    })
}

impl Database {
    /// Records a clipboard payload observed now.
    pub async fn write(&self, payload: &[u8]) -> Result<(), StorageError> {
        self.write_at(payload, Utc::now()).await
    }

    /// Records a clipboard payload observed at `captured_at`.
    ///
    /// Content already present only has its timestamp bumped, and a bump
    /// never moves an entry backwards in time.
    pub async fn write_at(
        &self,
        payload: &[u8],
        captured_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let text_hash = content_hash(payload);
        let text = String::from_utf8_lossy(payload).into_owned();
        let stamp = format_timestamp(captured_at);

        self.execute(move |conn| {
            // Lookup and insert must not interleave with another writer.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .op("begin write transaction")?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM clipboard_entries WHERE text_hash = ?1 ORDER BY id LIMIT 1",
                    params![text_hash],
                    |row| row.get(0),
                )
                .optional()
                .op("look up entry by hash")?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE clipboard_entries
                         SET captured_at = MAX(captured_at, ?1)
                         WHERE id = ?2",
                        params![stamp, id],
                    )
                    .op("bump entry timestamp")?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO clipboard_entries (clip_text, text_hash, captured_at)
                         VALUES (?1, ?2, ?3)",
                        params![text, text_hash, stamp],
                    )
                    .op("insert entry")?;
                }
            }

            tx.commit().op("commit write")?;
            Ok(())
        })
        .await
    }

    /// Most recent entries first, skipping `offset` and returning at most `limit`.
    pub async fn read(&self, offset: usize, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let offset = to_i64(offset)?;
        let limit = to_i64(limit)?;

        self.query(move |conn| {
            // Equal timestamps: the later insert is listed first.
            let mut stmt = conn
                .prepare(
                    "SELECT id, clip_text, text_hash, captured_at
                     FROM clipboard_entries
                     ORDER BY captured_at DESC, id DESC
                     LIMIT ?1 OFFSET ?2",
                )
                .op("prepare history page")?;

            let mut rows = stmt.query(params![limit, offset]).op("read history page")?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next().op("read history page")? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        self.query(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM clipboard_entries", [], |row| row.get(0))
                .op("count entries")?;
            to_usize(total, "count")
        })
        .await
    }

    /// Removes entries last seen more than `ttl_days` days ago.
    pub async fn delete_oldest(&self, ttl_days: u32) -> Result<usize, StorageError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(Duration::days(i64::from(ttl_days))) else {
            return Ok(0);
        };
        self.delete_captured_before(cutoff).await
    }

    pub async fn delete_captured_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let cutoff = format_timestamp(cutoff);
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM clipboard_entries WHERE captured_at < ?1",
                    params![cutoff],
                )
                .op("delete expired entries")?;
            Ok(deleted)
        })
        .await
    }

    /// Removes the `count` least recently seen entries.
    pub async fn delete_excess(&self, count: usize) -> Result<usize, StorageError> {
        if count == 0 {
            return Ok(0);
        }
        let count = to_i64(count)?;

        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM clipboard_entries
                     WHERE id IN (
                         SELECT id FROM clipboard_entries
                         ORDER BY captured_at ASC, id ASC
                         LIMIT ?1
                     )",
                    params![count],
                )
                .op("delete excess entries")?;
            Ok(deleted)
        })
        .await
    }

    pub async fn reset(&self) -> Result<usize, StorageError> {
        self.execute(|conn| {
            let deleted = conn
                .execute("DELETE FROM clipboard_entries", [])
                .op("reset history")?;
            Ok(deleted)
        })
        .await
    }
}
