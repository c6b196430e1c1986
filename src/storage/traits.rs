//! Storage traits and error types
//!
//! This module defines the trait interface for record sinks and the error
//! type shared by the record writer and the checkpoint store.

use crate::storage::ArticleRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint location not writable: {0}")]
    CheckpointDir(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for article records
///
/// One record is written per terminal result. Implementations must be
/// thread-safe and must treat a second record for the same URL as a
/// replacement, so a URL re-fetched after a crash still yields one row.
pub trait RecordSink: Send + Sync {
    /// Writes (or replaces) the record for `record.url`
    fn write_record(&self, record: &ArticleRecord) -> StorageResult<()>;
}
