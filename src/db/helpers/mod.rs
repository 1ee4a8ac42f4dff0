use std::convert::TryFrom;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::db::error::StorageError;

pub fn to_i64(value: usize) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::Value(format!("value {value} exceeds SQLite INTEGER range")))
}

pub fn to_usize(value: i64, field: &str) -> Result<usize, StorageError> {
    usize::try_from(value)
        .map_err(|_| StorageError::Value(format!("{field} contains negative value {value}")))
}

/// Fixed-width RFC 3339 so that lexical order in SQLite matches time order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StorageError::Value(format!("failed to parse {field} '{value}': {err}")))
}

/// Hex SHA-256 of the raw payload; the dedup key for history entries.
pub fn content_hash(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}
