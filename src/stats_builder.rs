/// Statistics aggregation and report building.
///
/// Accumulates in-window executions into a per-crawler report, then folds
/// the crawler reports into the global totals of an `AggregateReport`.
use indexmap::IndexMap;

use crate::crawl::types::{CrawlerInfo, ExecutionRecord};
use crate::stats::*;
use crate::window::ReportWindow;

// ============================================================================
// Per-crawler accumulation
// ============================================================================

/// Running counters for one crawler while its pages are walked.
#[derive(Debug)]
pub struct CrawlerAccumulator {
    custom_id: Option<String>,
    stats: StatsMap,
    executions_total: u64,
    executions_by_status: IndexMap<String, u64>,
    by_tag: IndexMap<String, CounterBucket>,
}

impl CrawlerAccumulator {
    pub fn new(crawler: &CrawlerInfo) -> Self {
        Self {
            custom_id: crawler.custom_id.clone(),
            stats: StatsMap::new(),
            executions_total: 0,
            executions_by_status: IndexMap::new(),
            by_tag: IndexMap::new(),
        }
    }

    /// Adds one in-window execution at crawler and tag level.
    pub fn record(&mut self, execution: &ExecutionRecord) {
        let tag = execution
            .tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .unwrap_or(NO_TAG);

        self.stats.merge(&execution.stats);
        self.by_tag
            .entry(tag.to_string())
            .or_default()
            .record(&execution.stats);

        self.executions_total += 1;
        *self
            .executions_by_status
            .entry(execution.status.to_lowercase())
            .or_insert(0) += 1;
    }

    pub fn executions_total(&self) -> u64 {
        self.executions_total
    }

    /// Freezes the counters. Crawlers without in-window executions yield None.
    pub fn finish(self) -> Option<CrawlerReport> {
        if self.executions_total == 0 {
            return None;
        }

        Some(CrawlerReport {
            custom_id: self.custom_id,
            stats: self.stats,
            executions_total: self.executions_total,
            executions_by_status: self.executions_by_status,
            by_tag: self.by_tag,
        })
    }
}

// ============================================================================
// Global reduction
// ============================================================================

/// Folds crawler reports into the final report.
///
/// Totals are the merge-sum of every crawler's stats, and the execution
/// count is the sum of their `executions_total`. Crawler order is kept.
pub fn build_report(
    window: &ReportWindow,
    crawler_reports: impl IntoIterator<Item = (String, CrawlerReport)>,
) -> AggregateReport {
    let mut totals = CounterBucket::default();
    let mut crawlers = IndexMap::new();

    for (crawler_id, report) in crawler_reports {
        totals.stats.merge(&report.stats);
        totals.executions_count += report.executions_total;
        crawlers.insert(crawler_id, report);
    }

    AggregateReport {
        window: window.clone(),
        totals,
        crawlers_count: crawlers.len(),
        crawlers,
    }
}
