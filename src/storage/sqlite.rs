//! SQLite record sink implementation
//!
//! This module provides a SQLite-based implementation of the RecordSink trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, StorageResult};
use crate::storage::ArticleRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-backed article store
pub struct SqliteRecordSink {
    conn: Mutex<Connection>,
}

impl SqliteRecordSink {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRecordSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the record for a URL
    pub fn get_record(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT url, title, content, metadata, size_bytes, error, error_kind, attempts, fetched_at
             FROM articles WHERE url = ?1",
        )?;

        let row = stmt
            .query_row(params![url], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .optional()?;

        let Some((url, title, content, metadata, size_bytes, error, error_kind, attempts, fetched_at)) =
            row
        else {
            return Ok(None);
        };

        let metadata: BTreeMap<String, serde_json::Value> = serde_json::from_str(&metadata)?;
        let fetched_at = fetched_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(ArticleRecord {
            url,
            title,
            content,
            metadata,
            size_bytes: size_bytes.max(0) as u64,
            error,
            error_kind,
            attempts,
            fetched_at,
        }))
    }

    /// Gets total record count
    pub fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Counts records carrying an error
    pub fn count_failed(&self) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM articles WHERE error IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl RecordSink for SqliteRecordSink {
    fn write_record(&self, record: &ArticleRecord) -> StorageResult<()> {
        let metadata = serde_json::to_string(&record.metadata)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO articles
                (url, title, content, metadata, size_bytes, error, error_kind, attempts, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.url,
                record.title,
                record.content,
                metadata,
                record.size_bytes as i64,
                record.error,
                record.error_kind,
                record.attempts,
                record.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
