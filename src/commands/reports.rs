/// The `reports` command: inspect the local SQLite store.
use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::sink::SqliteStore;
use crate::timefmt::format_timestamp;

/// Lists stored records, or prints one record's body when `key` is given.
pub fn run(data_root: &Path, key: Option<&str>) -> Result<()> {
    if !data_root.join("store.sqlite").exists() {
        eprintln!("No local store in {}", data_root.display());
        eprintln!("Run `crawler-stats aggregate --sink sqlite` to create one.");
        return Ok(());
    }

    let store = SqliteStore::init(data_root).context("Failed to open local store")?;

    if let Some(key) = key {
        match store.get_record(key)? {
            Some(record) => {
                println!("{}", record.body);
                return Ok(());
            }
            None => bail!("No record with key {}", key),
        }
    }

    let records = store.list_records()?;
    if records.is_empty() {
        println!("Store is empty.");
        return Ok(());
    }

    println!("{} record(s) in {}", records.len(), data_root.display());
    for record in records {
        println!(
            "  {}  {:>9}  {:<32}  {}",
            format_timestamp(record.updated_at),
            format!("{} B", record.size),
            record.content_type,
            record.key
        );
    }
    Ok(())
}
