/// Report persistence.
///
/// A run produces a handful of records (the JSON data record plus one page
/// per render format). Sinks receive all of them in one call so each
/// implementation can make the write all-or-nothing.
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, StatsError};

pub mod kv;
pub mod sqlite;

pub use kv::KvStoreSink;
pub use sqlite::SqliteStore;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One keyed blob to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub content_type: String,
    pub body: String,
}

impl Record {
    pub fn new(
        key: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Destination for the records of a run.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Stores every record and returns their locations, in input order.
    async fn put_records(&self, records: &[Record]) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Files in an output directory
    #[default]
    Dir,
    /// The local SQLite store under the data root
    Sqlite,
    /// The hosted key-value store
    Kv,
}

/// Writes records as files named after their keys.
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StatsError::Sink(format!("Invalid record key: {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}

#[async_trait]
impl ReportSink for DirSink {
    async fn put_records(&self, records: &[Record]) -> Result<Vec<String>> {
        let targets = records
            .iter()
            .map(|record| self.path_for(&record.key))
            .collect::<Result<Vec<_>>>()?;

        std::fs::create_dir_all(&self.root).map_err(|e| {
            StatsError::Sink(format!(
                "Failed to create output directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        // Stage every record first so a failed write leaves no final file behind
        let mut staged: Vec<PathBuf> = Vec::with_capacity(records.len());
        for (record, target) in records.iter().zip(&targets) {
            let tmp = target.with_file_name(format!("{}.tmp", record.key));
            if let Err(e) = std::fs::write(&tmp, &record.body) {
                staged.iter().for_each(|path| remove_quietly(path));
                return Err(StatsError::Sink(format!(
                    "Failed to write {}: {}",
                    tmp.display(),
                    e
                )));
            }
            staged.push(tmp);
        }

        let mut locations = Vec::with_capacity(records.len());
        for (i, (tmp, target)) in staged.iter().zip(&targets).enumerate() {
            if let Err(e) = std::fs::rename(tmp, target) {
                // Undo the records already moved into place
                targets[..i].iter().for_each(|path| remove_quietly(path));
                staged[i..].iter().for_each(|path| remove_quietly(path));
                return Err(StatsError::Sink(format!(
                    "Failed to move {} into place: {}",
                    target.display(),
                    e
                )));
            }
            debug!(path = %target.display(), "Wrote record");
            locations.push(target.display().to_string());
        }

        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::new("day_2025_3_19_data", JSON_CONTENT_TYPE, "{}"),
            Record::new("day_2025_3_19.html", "text/html; charset=utf-8", "<html></html>"),
        ]
    }

    #[tokio::test]
    async fn test_dir_sink_writes_all_records() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = DirSink::new(dir.path().join("out"));

        let locations = sink.put_records(&records()).await?;

        assert_eq!(locations.len(), 2);
        assert!(locations[0].ends_with("day_2025_3_19_data"));
        let html = std::fs::read_to_string(dir.path().join("out/day_2025_3_19.html"))?;
        assert_eq!(html, "<html></html>");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_dir_sink_rejects_path_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = DirSink::new(dir.path());

        let mut bad = records();
        bad.push(Record::new("../escape", JSON_CONTENT_TYPE, "{}"));
        let result = sink.put_records(&bad).await;

        assert!(matches!(result, Err(StatsError::Sink(_))));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_dir_sink_failed_move_removes_written_records() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out");
        // A non-empty directory where the second record should land
        std::fs::create_dir_all(out.join("day_2025_3_19.html"))?;
        std::fs::write(out.join("day_2025_3_19.html").join("keep"), "x")?;

        let records = vec![
            Record::new("day_2025_3_19.md", "text/markdown; charset=utf-8", "# Report"),
            Record::new("day_2025_3_19.html", "text/html; charset=utf-8", "<html></html>"),
        ];
        let result = DirSink::new(&out).put_records(&records).await;

        assert!(matches!(result, Err(StatsError::Sink(_))));
        let mut names: Vec<String> = std::fs::read_dir(&out)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["day_2025_3_19.html"]);
        Ok(())
    }

    #[test]
    fn test_sink_kind_serde() {
        let kind: SinkKind = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(kind, SinkKind::Sqlite);
        assert_eq!(SinkKind::default(), SinkKind::Dir);
    }
}
