//! Startup trimming of the history table.
//!
//! Runs once per daemon start, before capture begins. An age limit (`ttl`)
//! always wins over size-based trimming when it is positive.

use log::info;

use crate::db::{Database, StorageError};
use crate::settings::{positive_or, Settings, DEFAULT_LIMIT, DEFAULT_MAX_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Disabled,
    /// Drop entries last seen more than this many days ago.
    MaxAge { days: u32 },
    /// Once the table grows past `max_size`, trim it back to `keep` entries.
    MaxSize { max_size: usize, keep: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionOutcome {
    Skipped,
    Expired { deleted: usize },
    Trimmed { deleted: usize },
    WithinBounds { total: usize },
}

impl RetentionPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        if !settings.clean_up {
            return Self::Disabled;
        }

        if settings.ttl > 0 {
            return Self::MaxAge {
                days: u32::try_from(settings.ttl).unwrap_or(u32::MAX),
            };
        }

        Self::MaxSize {
            max_size: positive_or(settings.max_size, DEFAULT_MAX_SIZE),
            keep: positive_or(settings.limit, DEFAULT_LIMIT),
        }
    }

    pub async fn apply(&self, db: &Database) -> Result<RetentionOutcome, StorageError> {
        let outcome = match *self {
            Self::Disabled => RetentionOutcome::Skipped,
            Self::MaxAge { days } => {
                let deleted = db.delete_oldest(days).await?;
                RetentionOutcome::Expired { deleted }
            }
            Self::MaxSize { max_size, keep } => {
                let total = db.count().await?;
                if total > max_size && keep < total {
                    let deleted = db.delete_excess(total - keep).await?;
                    RetentionOutcome::Trimmed { deleted }
                } else {
                    RetentionOutcome::WithinBounds { total }
                }
            }
        };

        info!("retention {:?}: {:?}", self, outcome);
        Ok(outcome)
    }
}

/// Reads the policy from `settings` and applies it.
pub async fn clean_old_history(
    db: &Database,
    settings: &Settings,
) -> Result<RetentionOutcome, StorageError> {
    RetentionPolicy::from_settings(settings).apply(db).await
}
