/// Local report store
///
/// Keeps every record of every run in one SQLite file under the data root,
/// keyed by record key. Writing a key again replaces the previous body.
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::{Record, ReportSink};
use crate::error::{Result, StatsError};

/// A stored record without its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecordInfo {
    pub key: String,
    pub content_type: String,
    pub size: usize,
    pub updated_at: i64, // Unix timestamp in milliseconds
}

/// Database handle for the report store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize or open the store in `data_root`
    pub fn init(data_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_root).map_err(|e| {
            StatsError::Sink(format!(
                "Failed to create data directory {}: {}",
                data_root.display(),
                e
            ))
        })?;

        let db_path = data_root.join("store.sqlite");
        let conn = Connection::open(&db_path).map_err(|e| {
            StatsError::Sink(format!("Failed to open store at {}: {}", db_path.display(), e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                key TEXT NOT NULL PRIMARY KEY,
                content_type TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StatsError::Sink("Store connection lock poisoned".to_string()))
    }

    /// Upsert all records in a single transaction
    pub fn put_all(&self, records: &[Record]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();
        for record in records {
            tx.execute(
                "INSERT INTO records (key, content_type, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    content_type = excluded.content_type,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![record.key, record.content_type, record.body, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a stored record by key
    pub fn get_record(&self, key: &str) -> Result<Option<Record>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT key, content_type, body FROM records WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Record {
                        key: row.get(0)?,
                        content_type: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// List all records, most recently written first
    pub fn list_records(&self) -> Result<Vec<StoredRecordInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, content_type, LENGTH(CAST(body AS BLOB)), updated_at
             FROM records
             ORDER BY updated_at DESC, key",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(StoredRecordInfo {
                    key: row.get(0)?,
                    content_type: row.get(1)?,
                    size: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get the number of stored records
    pub fn record_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl ReportSink for SqliteStore {
    async fn put_records(&self, records: &[Record]) -> Result<Vec<String>> {
        self.put_all(records)?;
        Ok(records
            .iter()
            .map(|record| format!("sqlite:{}", record.key))
            .collect())
    }
}
