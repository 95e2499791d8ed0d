/// Crawler execution aggregation.
///
/// Pages through every crawler's execution history and folds the results
/// into a single `AggregateReport`.
///
/// # Architecture
///
/// The module is organized into focused submodules:
/// - **types**: Execution records, pages, and per-crawler outcomes
/// - **source**: Traits for the execution source and the crawler registry
/// - **decision**: Window classification and paging stop rules
/// - **pagination**: The per-crawler paging loop
/// - **progress**: Progress reporting and UI
use futures_util::{StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, StatsError};
use crate::stats::AggregateReport;
use crate::stats_builder::build_report;
use crate::window::ReportWindow;

pub mod types;
pub use types::{CrawlerInfo, CrawlerOutcome, ExecutionRecord, PageResult, StopReason};

pub mod source;
pub use source::{CrawlerRegistry, ExecutionSource};

pub mod decision;

pub mod pagination;
use pagination::paginate_crawler;

pub mod progress;
use progress::{format_completed_crawler, CrawlProgress};

/// Largest page the execution API serves.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Default number of executions requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default pause between two page fetches of the same crawler.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(100);

/// Tuning knobs of the aggregation engine.
#[derive(Clone, Debug)]
pub struct AggregateOptions {
    pub page_size: usize,
    pub page_delay: Duration,
    /// Number of crawlers paginated at the same time
    pub concurrency: usize,
    /// Overall time budget for the whole run
    pub deadline: Option<Duration>,
    /// Stop a crawler once a whole page is older than the window
    pub stop_on_stale_page: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            concurrency: 1,
            deadline: None,
            stop_on_stale_page: false,
        }
    }
}

/// Cooperative cancellation signal, checked before every page fetch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Aggregates the executions of `crawlers` that finished inside `window`.
///
/// Crawlers are paginated `options.concurrency` at a time (one by default);
/// their reports are folded in registry order, so the result does not depend
/// on completion order. The first error aborts the run and discards every
/// partial result.
pub async fn aggregate<S>(
    window: &ReportWindow,
    crawlers: &[CrawlerInfo],
    source: &S,
    options: &AggregateOptions,
    cancel: &CancelFlag,
    progress: &CrawlProgress,
) -> Result<AggregateReport>
where
    S: ExecutionSource + ?Sized,
{
    let run = aggregate_crawlers(window, crawlers, source, options, cancel, progress);

    let outcomes = match options.deadline {
        Some(deadline) => tokio::time::timeout(deadline, run)
            .await
            .map_err(|_| StatsError::DeadlineExceeded)??,
        None => run.await?,
    };

    let report = build_report(
        window,
        outcomes
            .into_iter()
            .filter_map(|outcome| outcome.report.map(|report| (outcome.crawler.id, report))),
    );

    if report.crawlers_count == 0 {
        warn!(window = %window.key, "No crawler has executions in the window");
    }
    info!(
        window = %window.key,
        crawlers = report.crawlers_count,
        executions = report.totals.executions_count,
        "Aggregation finished"
    );

    Ok(report)
}

async fn aggregate_crawlers<S>(
    window: &ReportWindow,
    crawlers: &[CrawlerInfo],
    source: &S,
    options: &AggregateOptions,
    cancel: &CancelFlag,
    progress: &CrawlProgress,
) -> Result<Vec<CrawlerOutcome>>
where
    S: ExecutionSource + ?Sized,
{
    let outcomes: Result<Vec<CrawlerOutcome>> = futures_util::stream::iter(crawlers)
        .map(|crawler| aggregate_single_crawler(window, crawler, source, options, cancel, progress))
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await;

    progress.finish();
    outcomes
}

/// Paginates one crawler with its own spinner and prints a summary line.
async fn aggregate_single_crawler<S>(
    window: &ReportWindow,
    crawler: &CrawlerInfo,
    source: &S,
    options: &AggregateOptions,
    cancel: &CancelFlag,
    progress: &CrawlProgress,
) -> Result<CrawlerOutcome>
where
    S: ExecutionSource + ?Sized,
{
    let (progress_callback, spinner) = progress.make_callback(crawler.label().to_string());

    let result = paginate_crawler(
        source,
        crawler,
        window,
        options,
        cancel,
        &*progress_callback,
    )
    .await;

    if let Some(ref sp) = spinner {
        sp.finish_and_clear();
    }

    match result {
        Ok(outcome) => {
            let formatted = format_completed_crawler(
                crawler.label(),
                outcome.in_window,
                outcome.pages_fetched,
                outcome.stop_reason,
            );
            progress.println(&format!("  ✓ {}", formatted));
            progress.inc();
            Ok(outcome)
        }
        Err(e) => {
            progress.println(&format!("  \x1b[31m✗\x1b[0m {} ({})", crawler.label(), e));
            Err(e)
        }
    }
}
