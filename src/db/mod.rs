mod connection;
mod error;
mod migrations;
mod repositories;

pub mod helpers;
pub mod models;

pub use connection::Database;
pub use error::StorageError;
pub use models::HistoryEntry;
