/// Execution pagination and accumulation.
///
/// Walks one crawler's execution history page by page (newest first),
/// accumulating in-window executions and stopping as soon as the decision
/// rules say no further page can hold one.
use tracing::debug;

use super::decision::{classify, decide_after_page, PagingDecision};
use super::progress::PageProgress;
use super::source::ExecutionSource;
use super::types::{CrawlerInfo, CrawlerOutcome, PageSummary, Placement};
use super::{AggregateOptions, CancelFlag};
use crate::error::{Result, StatsError};
use crate::stats_builder::CrawlerAccumulator;
use crate::window::ReportWindow;

/// Paginates a crawler's executions and builds its report.
///
/// Pages are fetched strictly one after another, with `options.page_delay`
/// between them. The cancel flag is checked before every fetch. Any fetch
/// error aborts the crawler (and with it the run).
///
/// # Callback
///
/// Invoked after each page with the page offset, the reported total and the
/// in-window count so far.
pub async fn paginate_crawler<S, F>(
    source: &S,
    crawler: &CrawlerInfo,
    window: &ReportWindow,
    options: &AggregateOptions,
    cancel: &CancelFlag,
    progress_callback: F,
) -> Result<CrawlerOutcome>
where
    S: ExecutionSource + ?Sized,
    F: Fn(&PageProgress),
{
    let mut accumulator = CrawlerAccumulator::new(crawler);
    let mut offset = 0usize;
    let mut pages_fetched = 0usize;
    let mut before_so_far = 0usize;

    let stop_reason = loop {
        if cancel.is_cancelled() {
            return Err(StatsError::Cancelled);
        }

        let page = source
            .fetch_page(&crawler.id, offset, options.page_size)
            .await?;
        pages_fetched += 1;

        let mut before_on_page = 0usize;
        for execution in &page.items {
            match classify(window, execution) {
                Placement::InWindow => accumulator.record(execution),
                Placement::BeforeWindow => before_on_page += 1,
                Placement::AfterWindow | Placement::Unfinished => {}
            }
        }
        before_so_far += before_on_page;

        debug!(
            crawler = %crawler.id,
            offset,
            items = page.items.len(),
            total = page.total_count,
            before_on_page,
            before_so_far,
            "Fetched execution page"
        );

        progress_callback(&PageProgress {
            offset,
            total_count: page.total_count,
            in_window: accumulator.executions_total(),
        });

        let summary = PageSummary {
            offset,
            page_size: options.page_size,
            item_count: page.items.len(),
            total_count: page.total_count,
            before_on_page,
            before_so_far,
        };

        match decide_after_page(&summary, options.stop_on_stale_page) {
            PagingDecision::Stop(reason) => break reason,
            PagingDecision::Continue { next_offset } => {
                offset = next_offset;
                // Pace requests to stay under the API rate limit
                if !options.page_delay.is_zero() {
                    tokio::time::sleep(options.page_delay).await;
                }
            }
        }
    };

    let in_window = accumulator.executions_total();
    debug!(
        crawler = %crawler.id,
        pages_fetched,
        in_window,
        ?stop_reason,
        "Finished paging crawler"
    );

    Ok(CrawlerOutcome {
        crawler: crawler.clone(),
        report: accumulator.finish(),
        pages_fetched,
        in_window,
        before_window: before_so_far,
        stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::types::{ExecutionRecord, PageResult, StopReason};
    use crate::stats::MetricValue;
    use crate::window::{resolve_window, PeriodKind};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Serves a fixed newest-first history and records requested offsets.
    struct HistorySource {
        executions: Vec<ExecutionRecord>,
        reported_total: Option<usize>,
        omit_total: bool,
        calls: Mutex<Vec<usize>>,
    }

    impl HistorySource {
        fn new(executions: Vec<ExecutionRecord>) -> Self {
            Self {
                executions,
                reported_total: None,
                omit_total: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionSource for HistorySource {
        async fn fetch_page(
            &self,
            _crawler_id: &str,
            offset: usize,
            limit: usize,
        ) -> Result<PageResult> {
            self.calls.lock().unwrap().push(offset);
            let items = self
                .executions
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect();
            if self.omit_total {
                return Ok(PageResult::with_unknown_total(items, offset, limit));
            }
            Ok(PageResult {
                items,
                total_count: self.reported_total.unwrap_or(self.executions.len()),
                offset,
            })
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ExecutionSource for FailingSource {
        async fn fetch_page(&self, _: &str, _: usize, _: usize) -> Result<PageResult> {
            Err(StatsError::SourceUnavailable("connection reset".to_string()))
        }
    }

    fn window() -> ReportWindow {
        let reference = Utc.with_ymd_and_hms(2025, 3, 19, 12, 0, 0).unwrap();
        resolve_window(PeriodKind::IsoWeek, reference, false).unwrap()
    }

    fn crawler() -> CrawlerInfo {
        CrawlerInfo {
            id: "A".to_string(),
            custom_id: Some("alpha".to_string()),
        }
    }

    fn options(page_size: usize) -> AggregateOptions {
        AggregateOptions {
            page_size,
            page_delay: std::time::Duration::ZERO,
            ..AggregateOptions::default()
        }
    }

    fn execution(finished_at: DateTime<Utc>, pages: i64) -> ExecutionRecord {
        ExecutionRecord {
            id: format!("exec-{}", finished_at.timestamp()),
            crawler_id: "A".to_string(),
            tag: None,
            finished_at: Some(finished_at),
            status: "SUCCEEDED".to_string(),
            stats: [("pagesCrawled", pages)].into_iter().collect(),
        }
    }

    async fn run<S: ExecutionSource + ?Sized>(
        source: &S,
        options: &AggregateOptions,
    ) -> Result<CrawlerOutcome> {
        paginate_crawler(source, &crawler(), &window(), options, &CancelFlag::new(), |_| {}).await
    }

    /// `in_window` executions inside the window followed by `older` ones, newest first.
    fn history(in_window: usize, older: usize) -> Vec<ExecutionRecord> {
        let w = window();
        let mut executions = Vec::new();
        for i in 0..in_window {
            executions.push(execution(w.to - Duration::minutes(i as i64 + 1), 1));
        }
        for i in 0..older {
            executions.push(execution(w.from - Duration::hours(i as i64 + 1), 100));
        }
        executions
    }

    #[tokio::test]
    async fn accumulates_only_in_window_executions() -> anyhow::Result<()> {
        let source = HistorySource::new(history(7, 5));
        let outcome = run(&source, &options(100)).await?;

        let report = outcome.report.expect("in-window executions");
        assert_eq!(outcome.in_window, 7);
        assert_eq!(outcome.before_window, 5);
        assert_eq!(report.stats.get("pagesCrawled"), Some(MetricValue::Int(7)));
        Ok(())
    }

    #[tokio::test]
    async fn walks_multiple_pages_until_exhausted() -> anyhow::Result<()> {
        let source = HistorySource::new(history(25, 0));
        let outcome = run(&source, &options(10)).await?;

        assert_eq!(source.calls(), vec![0, 10, 20]);
        assert_eq!(outcome.in_window, 25);
        assert_eq!(outcome.stop_reason, StopReason::SourceExhausted);
        Ok(())
    }

    #[tokio::test]
    async fn terminates_within_page_bound() -> anyhow::Result<()> {
        for (in_window, older, page_size) in [(0, 50, 10), (3, 97, 7), (40, 0, 10), (1, 1, 1)] {
            let source = HistorySource::new(history(in_window, older));
            let total = in_window + older;
            paginate_crawler(
                &source,
                &crawler(),
                &window(),
                &options(page_size),
                &CancelFlag::new(),
                |_| {},
            )
            .await?;

            let bound = total.div_ceil(page_size) + 1;
            assert!(
                source.calls().len() <= bound,
                "{} calls for total {} and page size {}",
                source.calls().len(),
                total,
                page_size
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn stale_page_rule_stops_early() -> anyhow::Result<()> {
        let source = HistorySource::new(history(3, 47));
        let mut opts = options(10);
        opts.stop_on_stale_page = true;
        let outcome = run(&source, &opts).await?;

        // page 0 straddles the boundary, page 10 is entirely older
        assert_eq!(source.calls(), vec![0, 10]);
        assert_eq!(outcome.stop_reason, StopReason::StalePage);
        assert_eq!(outcome.in_window, 3);
        Ok(())
    }

    #[tokio::test]
    async fn empty_history_yields_no_report() -> anyhow::Result<()> {
        let source = HistorySource::new(Vec::new());
        let outcome = run(&source, &options(10)).await?;

        assert!(outcome.report.is_none());
        assert_eq!(outcome.stop_reason, StopReason::EmptyPage);
        assert_eq!(source.calls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn understated_total_costs_at_most_one_extra_page() -> anyhow::Result<()> {
        let mut source = HistorySource::new(history(15, 0));
        source.reported_total = Some(12);
        let outcome = run(&source, &options(10)).await?;

        assert_eq!(source.calls(), vec![0, 10]);
        assert_eq!(outcome.in_window, 15);
        Ok(())
    }

    #[tokio::test]
    async fn pages_on_while_full_pages_come_without_total() -> anyhow::Result<()> {
        let mut source = HistorySource::new(history(25, 0));
        source.omit_total = true;
        let outcome = run(&source, &options(10)).await?;

        assert_eq!(source.calls(), vec![0, 10, 20]);
        assert_eq!(outcome.in_window, 25);
        assert_eq!(outcome.stop_reason, StopReason::SourceExhausted);

        let mut source = HistorySource::new(history(20, 0));
        source.omit_total = true;
        let outcome = run(&source, &options(10)).await?;

        assert_eq!(source.calls(), vec![0, 10, 20]);
        assert_eq!(outcome.in_window, 20);
        assert_eq!(outcome.stop_reason, StopReason::EmptyPage);
        Ok(())
    }

    #[tokio::test]
    async fn tolerates_executions_after_window() -> anyhow::Result<()> {
        let w = window();
        let mut executions = vec![execution(w.to + Duration::days(1), 50)];
        executions.extend(history(2, 1));
        let source = HistorySource::new(executions);

        let outcome =
            paginate_crawler(&source, &crawler(), &w, &options(100), &CancelFlag::new(), |_| {})
                .await?;

        assert_eq!(outcome.in_window, 2);
        assert_eq!(outcome.before_window, 1);
        let report = outcome.report.unwrap();
        assert_eq!(report.stats.get("pagesCrawled"), Some(MetricValue::Int(2)));
        Ok(())
    }

    #[tokio::test]
    async fn reports_progress_after_each_page() -> anyhow::Result<()> {
        let source = HistorySource::new(history(12, 0));
        let seen = Mutex::new(Vec::new());
        paginate_crawler(&source, &crawler(), &window(), &options(5), &CancelFlag::new(), |p| {
            seen.lock().unwrap().push((p.offset, p.in_window));
        })
        .await?;

        assert_eq!(*seen.lock().unwrap(), vec![(0, 5), (5, 10), (10, 12)]);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_failure_aborts() {
        let result = run(&FailingSource, &options(10)).await;
        assert!(matches!(result, Err(StatsError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn cancelled_before_first_fetch() {
        let source = HistorySource::new(history(3, 0));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result =
            paginate_crawler(&source, &crawler(), &window(), &options(10), &cancel, |_| {}).await;
        assert!(matches!(result, Err(StatsError::Cancelled)));
        assert!(source.calls().is_empty());
    }
}
