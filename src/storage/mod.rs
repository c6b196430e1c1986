//! Storage module for persisting harvest results
//!
//! This module handles everything that touches durable storage:
//! - The SQLite article record database
//! - The JSON checkpoint used to resume interrupted runs

mod checkpoint;
mod schema;
mod sqlite;
mod traits;

pub use checkpoint::{read_checkpoint, Checkpoint, CheckpointStore, CHECKPOINT_SCHEMA_VERSION};
pub use sqlite::SqliteRecordSink;
pub use traits::{RecordSink, StorageError, StorageResult};

use crate::crawler::FetchResult;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Opens (or creates) the article record database
pub fn open_record_store(path: &Path) -> StorageResult<SqliteRecordSink> {
    SqliteRecordSink::new(path)
}

/// One output row: the terminal outcome for a URL
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub size_bytes: u64,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub attempts: u32,
    pub fetched_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Builds the record for `url` from its terminal result
    pub fn from_result(url: &str, outcome: &FetchResult, attempts: u32) -> Self {
        let fetched_at = Utc::now();
        match outcome {
            FetchResult::Success {
                title,
                content,
                metadata,
                size_bytes,
            } => Self {
                url: url.to_string(),
                title: Some(title.clone()),
                content: Some(content.clone()),
                metadata: metadata.clone(),
                size_bytes: *size_bytes as u64,
                error: None,
                error_kind: None,
                attempts,
                fetched_at,
            },
            FetchResult::Failure { kind, message } => Self {
                url: url.to_string(),
                title: None,
                content: None,
                metadata: BTreeMap::new(),
                size_bytes: 0,
                error: Some(message.clone()),
                error_kind: Some(kind.as_str().to_string()),
                attempts,
                fetched_at,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
