/// Data structures for the crawl module.
use chrono::{DateTime, Utc};

use crate::stats::StatsMap;

/// A crawler as listed by the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlerInfo {
    pub id: String,
    pub custom_id: Option<String>,
}

impl CrawlerInfo {
    /// Human-readable name, falling back to the id.
    pub fn label(&self) -> &str {
        self.custom_id.as_deref().unwrap_or(&self.id)
    }
}

/// One execution of a crawler, read-only input to the aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub crawler_id: String,
    pub tag: Option<String>,
    /// None while the execution is still running
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub stats: StatsMap,
}

/// One page of a crawler's execution history, newest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageResult {
    pub items: Vec<ExecutionRecord>,
    /// Total number of executions the source claims to hold (may be approximate)
    pub total_count: usize,
    pub offset: usize,
}

impl PageResult {
    /// Builds a page for a source that reported no total.
    ///
    /// A full page claims one execution more than it holds so the paging
    /// loop asks for the next page; a short page marks the end of history.
    pub fn with_unknown_total(items: Vec<ExecutionRecord>, offset: usize, limit: usize) -> Self {
        let seen = offset + items.len();
        let total_count = if items.len() >= limit { seen + 1 } else { seen };
        Self {
            items,
            total_count,
            offset,
        }
    }
}

/// Where an execution falls relative to the report window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    InWindow,
    BeforeWindow,
    AfterWindow,
    Unfinished,
}

/// Counters for the page just processed, input to the stop decision.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageSummary {
    /// Offset requested for this page
    pub offset: usize,
    pub page_size: usize,
    pub item_count: usize,
    pub total_count: usize,
    pub before_on_page: usize,
    /// Before-window executions across every page fetched so far
    pub before_so_far: usize,
}

/// Why the paging loop of a crawler ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    OlderThanWindow,
    StalePage,
    SourceExhausted,
}

/// Outcome of paginating one crawler.
#[derive(Debug)]
pub struct CrawlerOutcome {
    pub crawler: CrawlerInfo,
    /// None when the crawler had no in-window executions
    pub report: Option<crate::stats::CrawlerReport>,
    pub pages_fetched: usize,
    pub in_window: u64,
    pub before_window: usize,
    pub stop_reason: StopReason,
}
