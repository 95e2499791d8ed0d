/// Collaborator seams of the aggregation engine.
use async_trait::async_trait;

use super::types::{CrawlerInfo, PageResult};
use crate::error::Result;

/// Pages through a crawler's execution history, newest `finishedAt` first.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    async fn fetch_page(&self, crawler_id: &str, offset: usize, limit: usize)
        -> Result<PageResult>;
}

/// Lists every crawler in one call.
#[async_trait]
pub trait CrawlerRegistry: Send + Sync {
    async fn list_crawlers(&self) -> Result<Vec<CrawlerInfo>>;
}
