//! Persistence for the emergency session.
//!
//! Preferences are JSON values in a key-value `settings` table; alert history
//! is a separate `alerts` table. Both live in one SQLite file.

mod database;
mod preferences;

pub use database::{Database, DATA_DIR_NAME, DATABASE_FILE_NAME};
pub use preferences::{keys, MemoryStore, PreferenceStore, PreferenceStoreRef, Preferences};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no per-user data directory on this platform")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, StorageError>;
