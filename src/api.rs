/// HTTP client for the hosted crawler API.
///
/// This module provides:
/// - Listing every crawler of an account (one call, no pagination)
/// - Paging through a crawler's executions, newest first
///
/// Both are exposed through the `CrawlerRegistry` and `ExecutionSource`
/// traits so the aggregation engine never sees HTTP.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiSettings;
use crate::crawl::{CrawlerInfo, CrawlerRegistry, ExecutionRecord, ExecutionSource, PageResult};
use crate::error::{Result, StatsError};
use crate::stats::{MetricValue, StatsMap};

const PAGINATION_TOTAL_HEADER: &str = "x-apify-pagination-total";
const PAGINATION_OFFSET_HEADER: &str = "x-apify-pagination-offset";

/// Request timeout for a single API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCrawler {
    #[serde(rename = "_id")]
    id: String,
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecution {
    #[serde(rename = "_id")]
    id: String,
    tag: Option<String>,
    finished_at: Option<DateTime<Utc>>,
    status: String,
    #[serde(default)]
    stats: Option<IndexMap<String, serde_json::Value>>,
}

impl RawExecution {
    fn into_record(self, crawler_id: &str) -> ExecutionRecord {
        let mut stats = StatsMap::new();
        for (metric, value) in self.stats.unwrap_or_default() {
            match MetricValue::from_json(&value) {
                Some(number) => stats.add(&metric, number),
                None => debug!(execution = %self.id, %metric, "Skipping non-numeric stat"),
            }
        }

        ExecutionRecord {
            id: self.id,
            crawler_id: crawler_id.to_string(),
            tag: self.tag,
            finished_at: self.finished_at,
            status: self.status,
            stats,
        }
    }
}

/// Client for the crawler registry and execution listing endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    user_id: String,
    token: String,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let user_id = settings
            .user_id
            .clone()
            .ok_or_else(|| StatsError::InvalidConfig("APIFY_USER_ID is not set".to_string()))?;
        let token = settings
            .token
            .clone()
            .ok_or_else(|| StatsError::InvalidConfig("APIFY_TOKEN is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("crawler-stats/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            user_id,
            token,
        })
    }

    /// Builds `{base}/v1/{user}/crawlers[/{crawler}/execs]` with the token attached.
    fn endpoint(&self, crawler_id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StatsError::InvalidConfig(format!("Invalid API base URL: {}", self.base_url))
            })?;
            segments.pop_if_empty().extend(["v1", self.user_id.as_str(), "crawlers"]);
            if let Some(id) = crawler_id {
                segments.extend([id, "execs"]);
            }
        }
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<(HeaderMap, String)> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok((headers, body))
    }
}

#[async_trait]
impl CrawlerRegistry for ApiClient {
    async fn list_crawlers(&self) -> Result<Vec<CrawlerInfo>> {
        let url = self.endpoint(None)?;
        let (_headers, body) = self.get(url).await?;
        parse_crawlers(&body)
    }
}

#[async_trait]
impl ExecutionSource for ApiClient {
    async fn fetch_page(
        &self,
        crawler_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PageResult> {
        let mut url = self.endpoint(Some(crawler_id))?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("desc", "1");

        let (headers, body) = self.get(url).await?;
        parse_execution_page(
            crawler_id,
            offset,
            limit,
            header_usize(&headers, PAGINATION_TOTAL_HEADER),
            header_usize(&headers, PAGINATION_OFFSET_HEADER),
            &body,
        )
    }
}

fn header_usize(headers: &HeaderMap, name: &str) -> Option<usize> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn parse_crawlers(body: &str) -> Result<Vec<CrawlerInfo>> {
    let raw: Vec<RawCrawler> = serde_json::from_str(body)
        .map_err(|e| StatsError::SourceUnavailable(format!("Malformed crawler list: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|c| CrawlerInfo {
            id: c.id,
            custom_id: c.custom_id,
        })
        .collect())
}

/// Turns an execution listing response into a page.
///
/// Without a total header paging goes on while pages come back full.
fn parse_execution_page(
    crawler_id: &str,
    requested_offset: usize,
    limit: usize,
    total: Option<usize>,
    offset: Option<usize>,
    body: &str,
) -> Result<PageResult> {
    let raw: Vec<RawExecution> = serde_json::from_str(body).map_err(|e| {
        StatsError::SourceUnavailable(format!(
            "Malformed execution list for crawler {}: {}",
            crawler_id, e
        ))
    })?;

    let offset = offset.unwrap_or(requested_offset);
    let items: Vec<ExecutionRecord> = raw
        .into_iter()
        .map(|execution| execution.into_record(crawler_id))
        .collect();

    match total {
        Some(total_count) => Ok(PageResult {
            items,
            total_count,
            offset,
        }),
        None => {
            warn!(
                crawler = %crawler_id,
                offset,
                "No {} header, paging until a short page",
                PAGINATION_TOTAL_HEADER
            );
            Ok(PageResult::with_unknown_total(items, offset, limit))
        }
    }
}
