/// Hosted key-value store sink.
///
/// Each record becomes a `PUT {base}/v2/key-value-stores/{store}/records/{key}`.
/// The store has no transactions: records are sent in order, and when one
/// fails the records already stored by this call are deleted again.
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Record, ReportSink};
use crate::config::ApiSettings;
use crate::error::{Result, StatsError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct KvStoreSink {
    http: reqwest::Client,
    base_url: Url,
    store_id: String,
    token: String,
}

impl KvStoreSink {
    pub fn new(settings: &ApiSettings, store_id: &str) -> Result<Self> {
        let token = settings
            .token
            .clone()
            .ok_or_else(|| StatsError::InvalidConfig("APIFY_TOKEN is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("crawler-stats/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StatsError::Sink(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            store_id: store_id.to_string(),
            token,
        })
    }

    /// Checks that the store exists, before any crawler is paged.
    pub async fn verify(&self) -> Result<()> {
        let url = self.store_url(&[])?;
        let response = self.http.get(url).send().await.map_err(|e| {
            StatsError::Sink(format!("Failed to look up store {}: {}", self.store_id, e))
        })?;
        check_store_status(response.status(), &self.store_id)?;
        info!(store = %self.store_id, "Key-value store found");
        Ok(())
    }

    /// Builds `{base}/v2/key-value-stores/{store}[/{extra}...]` with the token attached.
    fn store_url(&self, extra: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StatsError::InvalidConfig(format!("Invalid API base URL: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v2", "key-value-stores", self.store_id.as_str()])
            .extend(extra);
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }

    fn record_url(&self, key: &str) -> Result<Url> {
        self.store_url(&["records", key])
    }

    /// Location reported back to the caller; carries no token.
    fn public_location(&self, key: &str) -> Result<String> {
        let mut url = self.record_url(key)?;
        url.set_query(None);
        Ok(url.to_string())
    }
}

/// Maps the status of a store lookup.
fn check_store_status(status: StatusCode, store_id: &str) -> Result<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(StatsError::InvalidConfig(format!(
            "Key-value store {} doesn't exist",
            store_id
        )));
    }
    if !status.is_success() {
        return Err(StatsError::Sink(format!(
            "Key-value store {} lookup failed with status {}",
            store_id, status
        )));
    }
    Ok(())
}

/// Single-record operations of a store without transactions.
#[async_trait]
trait RecordEndpoint: Send + Sync {
    /// Stores one record and returns its location.
    async fn put(&self, record: &Record) -> Result<String>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl RecordEndpoint for KvStoreSink {
    async fn put(&self, record: &Record) -> Result<String> {
        let url = self.record_url(&record.key)?;
        self.http
            .put(url)
            .header(CONTENT_TYPE, &record.content_type)
            .body(record.body.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                StatsError::Sink(format!("Failed to store record {}: {}", record.key, e))
            })?;

        debug!(store = %self.store_id, key = %record.key, "Stored record");
        self.public_location(&record.key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.record_url(key)?;
        self.http
            .delete(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| StatsError::Sink(format!("Failed to delete record {}: {}", key, e)))?;
        Ok(())
    }
}

/// Puts records one by one; on failure deletes the ones already stored.
///
/// Cleanup is best effort: a failed delete is logged and the put
/// error is returned.
async fn put_or_roll_back<E>(endpoint: &E, records: &[Record]) -> Result<Vec<String>>
where
    E: RecordEndpoint + ?Sized,
{
    let mut locations = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        match endpoint.put(record).await {
            Ok(location) => locations.push(location),
            Err(e) => {
                for stored in records[..i].iter().rev() {
                    if let Err(cleanup) = endpoint.delete(&stored.key).await {
                        warn!(key = %stored.key, error = %cleanup, "Failed to roll back record");
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(locations)
}

#[async_trait]
impl ReportSink for KvStoreSink {
    async fn put_records(&self, records: &[Record]) -> Result<Vec<String>> {
        put_or_roll_back(self, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::JSON_CONTENT_TYPE;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn settings() -> ApiSettings {
        ApiSettings {
            base_url: Url::parse("https://api.example.com").unwrap(),
            token: Some("secret".to_string()),
            user_id: None,
        }
    }

    /// In-memory store that rejects one key.
    struct FlakyStore {
        reject: &'static str,
        stored: Mutex<BTreeSet<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl FlakyStore {
        fn new(reject: &'static str) -> Self {
            Self {
                reject,
                stored: Mutex::new(BTreeSet::new()),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordEndpoint for FlakyStore {
        async fn put(&self, record: &Record) -> Result<String> {
            if record.key == self.reject {
                return Err(StatsError::Sink(format!("503 for {}", record.key)));
            }
            self.stored.lock().unwrap().insert(record.key.clone());
            Ok(format!("kv:{}", record.key))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.stored.lock().unwrap().remove(key);
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("month_2025_3.html", "text/html; charset=utf-8", "<html></html>"),
            Record::new("month_2025_3.md", "text/markdown; charset=utf-8", "# Report"),
            Record::new("month_2025_3_data", JSON_CONTENT_TYPE, "{}"),
        ]
    }

    #[test]
    fn test_record_url() {
        let sink = KvStoreSink::new(&settings(), "store1").unwrap();
        let url = sink.record_url("month_2025_3.html").unwrap();
        assert_eq!(url.path(), "/v2/key-value-stores/store1/records/month_2025_3.html");
        assert_eq!(url.query(), Some("token=secret"));
    }

    #[test]
    fn test_store_url() {
        let sink = KvStoreSink::new(&settings(), "store1").unwrap();
        let url = sink.store_url(&[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/key-value-stores/store1?token=secret"
        );
    }

    #[test]
    fn test_check_store_status() {
        assert!(check_store_status(StatusCode::OK, "store1").is_ok());
        assert!(matches!(
            check_store_status(StatusCode::NOT_FOUND, "store1"),
            Err(StatsError::InvalidConfig(msg)) if msg.contains("store1")
        ));
        assert!(matches!(
            check_store_status(StatusCode::UNAUTHORIZED, "store1"),
            Err(StatsError::Sink(_))
        ));
    }

    #[test]
    fn test_public_location_hides_token() {
        let sink = KvStoreSink::new(&settings(), "store1").unwrap();
        let location = sink.public_location("month_2025_3_data").unwrap();
        assert!(!location.contains("secret"));
        assert!(location.ends_with("/records/month_2025_3_data"));
    }

    #[test]
    fn test_requires_token() {
        let mut s = settings();
        s.token = None;
        assert!(matches!(
            KvStoreSink::new(&s, "store1"),
            Err(StatsError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_put_stores_every_record_in_order() -> anyhow::Result<()> {
        let store = FlakyStore::new("none");
        let locations = put_or_roll_back(&store, &records()).await?;

        assert_eq!(
            locations,
            ["kv:month_2025_3.html", "kv:month_2025_3.md", "kv:month_2025_3_data"]
        );
        assert_eq!(store.stored.lock().unwrap().len(), 3);
        assert!(store.deleted.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_put_removes_stored_records() {
        let store = FlakyStore::new("month_2025_3_data");
        let result = put_or_roll_back(&store, &records()).await;

        assert!(matches!(result, Err(StatsError::Sink(_))));
        assert!(store.stored.lock().unwrap().is_empty());
        assert_eq!(
            *store.deleted.lock().unwrap(),
            ["month_2025_3.md", "month_2025_3.html"]
        );
    }
}
