use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::path::Path;

use crawler_stats::commands::aggregate::execute;
use crawler_stats::config::{AggregateArgs, InputFile, RunConfig, WindowArgs};
use crawler_stats::crawl::{
    CancelFlag, CrawlerInfo, CrawlerRegistry, ExecutionRecord, ExecutionSource, PageResult,
};
use crawler_stats::error::{Result, StatsError};
use crawler_stats::sink::{DirSink, SqliteStore};
use crawler_stats::stats::{AggregateReport, MetricValue, StatsMap};

/// Registry and execution history held in memory, newest execution first.
struct FakeApi {
    crawlers: Vec<CrawlerInfo>,
    histories: HashMap<String, Vec<ExecutionRecord>>,
    broken: Option<String>,
}

#[async_trait]
impl CrawlerRegistry for FakeApi {
    async fn list_crawlers(&self) -> Result<Vec<CrawlerInfo>> {
        Ok(self.crawlers.clone())
    }
}

#[async_trait]
impl ExecutionSource for FakeApi {
    async fn fetch_page(
        &self,
        crawler_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PageResult> {
        if self.broken.as_deref() == Some(crawler_id) {
            return Err(StatsError::SourceUnavailable("503 Service Unavailable".to_string()));
        }
        let history = self.histories.get(crawler_id).cloned().unwrap_or_default();
        Ok(PageResult {
            total_count: history.len(),
            items: history.into_iter().skip(offset).take(limit).collect(),
            offset,
        })
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

fn execution(crawler: &str, finished_at: DateTime<Utc>, tag: &str, pages: i64) -> ExecutionRecord {
    let stats: StatsMap = [("pagesCrawled", pages), ("pagesFailed", 1)].into_iter().collect();
    ExecutionRecord {
        id: format!("{}-{}", crawler, finished_at.timestamp()),
        crawler_id: crawler.to_string(),
        tag: Some(tag.to_string()),
        finished_at: Some(finished_at),
        status: "SUCCEEDED".to_string(),
        stats,
    }
}

/// Crawler A ran twice in the week of 2025-03-17 and once the week before;
/// crawler B only ran the week before.
fn fake_api() -> FakeApi {
    let mut histories = HashMap::new();
    histories.insert(
        "A".to_string(),
        vec![
            execution("A", at(20, 9), "x", 10),
            execution("A", at(18, 9), "y", 5),
            execution("A", at(12, 9), "x", 1000),
        ],
    );
    histories.insert("B".to_string(), vec![execution("B", at(14, 9), "x", 7)]);

    FakeApi {
        crawlers: vec![
            CrawlerInfo {
                id: "A".to_string(),
                custom_id: Some("alpha".to_string()),
            },
            CrawlerInfo {
                id: "B".to_string(),
                custom_id: None,
            },
        ],
        histories,
        broken: None,
    }
}

fn config(formats: &[&str]) -> RunConfig {
    let args = AggregateArgs {
        window: WindowArgs {
            period: Some("isoWeek".to_string()),
            date: Some("2025-03-19".to_string()),
            finished_period: false,
        },
        page_size: Some(2),
        page_delay_ms: Some(0),
        formats: Some(formats.iter().map(|f| f.to_string()).collect()),
        ..AggregateArgs::default()
    };
    RunConfig::resolve(&args, &InputFile::default(), Utc::now()).unwrap()
}

fn load_report(path: &Path) -> anyhow::Result<AggregateReport> {
    AggregateReport::load_and_validate(path)
}

#[tokio::test]
async fn week_report_omits_idle_crawlers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = DirSink::new(dir.path());

    let output = execute(
        &config(&["html", "md"]),
        &fake_api(),
        &fake_api(),
        &sink,
        &CancelFlag::new(),
        false,
    )
    .await?;

    assert_eq!(output.report_key, "isoWeek_2025_3_17-23");
    assert_eq!(output.page_locations.len(), 2);
    assert!(output.data_location.ends_with("isoWeek_2025_3_17-23_data"));

    let report = load_report(&dir.path().join("isoWeek_2025_3_17-23_data"))?;
    assert_eq!(report.crawlers_count, 1);
    assert!(!report.crawlers.contains_key("B"));
    assert_eq!(report.totals.executions_count, 2);
    assert_eq!(report.totals.stats.get("pagesCrawled"), Some(MetricValue::Int(15)));
    assert_eq!(report.totals.stats.get("pagesFailed"), Some(MetricValue::Int(2)));

    let a = &report.crawlers["A"];
    assert_eq!(a.custom_id.as_deref(), Some("alpha"));
    assert_eq!(a.by_tag["x"].stats.get("pagesCrawled"), Some(MetricValue::Int(10)));
    assert_eq!(a.by_tag["y"].stats.get("pagesCrawled"), Some(MetricValue::Int(5)));
    assert_eq!(a.executions_by_status["succeeded"], 2);

    let md = std::fs::read_to_string(dir.path().join("isoWeek_2025_3_17-23.md"))?;
    assert!(md.contains("### alpha (`A`)"));
    assert!(dir.path().join("isoWeek_2025_3_17-23.html").exists());
    Ok(())
}

#[tokio::test]
async fn totals_are_the_sum_of_crawlers() -> anyhow::Result<()> {
    let mut api = fake_api();
    api.histories
        .get_mut("B")
        .unwrap()
        .insert(0, execution("B", at(23, 23), "nightly", 32));

    let dir = tempfile::tempdir()?;
    execute(
        &config(&["md"]),
        &api,
        &api,
        &DirSink::new(dir.path()),
        &CancelFlag::new(),
        false,
    )
    .await?;

    let report = load_report(&dir.path().join("isoWeek_2025_3_17-23_data"))?;
    assert_eq!(report.crawlers_count, 2);

    let mut summed = StatsMap::new();
    for crawler in report.crawlers.values() {
        summed.merge(&crawler.stats);
    }
    assert_eq!(summed, report.totals.stats);
    assert_eq!(report.totals.stats.get("pagesCrawled"), Some(MetricValue::Int(47)));
    Ok(())
}

#[tokio::test]
async fn sqlite_store_keeps_all_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SqliteStore::init(dir.path())?;

    let output = execute(
        &config(&["html"]),
        &fake_api(),
        &fake_api(),
        &store,
        &CancelFlag::new(),
        false,
    )
    .await?;

    assert_eq!(output.data_location, "sqlite:isoWeek_2025_3_17-23_data");
    assert_eq!(store.record_count()?, 2);
    let data = store
        .get_record("isoWeek_2025_3_17-23_data")?
        .expect("data record stored");
    let report: AggregateReport = serde_json::from_str(&data.body)?;
    assert_eq!(report.crawlers_count, 1);
    Ok(())
}

#[tokio::test]
async fn failed_run_writes_nothing() -> anyhow::Result<()> {
    let mut api = fake_api();
    api.broken = Some("B".to_string());

    let dir = tempfile::tempdir()?;
    let store = SqliteStore::init(dir.path())?;
    let out = dir.path().join("out");

    let result = execute(
        &config(&["html"]),
        &api,
        &api,
        &DirSink::new(&out),
        &CancelFlag::new(),
        false,
    )
    .await;
    assert!(matches!(result, Err(StatsError::SourceUnavailable(_))));
    assert!(!out.exists());

    let result = execute(&config(&["html"]), &api, &api, &store, &CancelFlag::new(), false).await;
    assert!(result.is_err());
    assert_eq!(store.record_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_run_writes_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = execute(
        &config(&["html"]),
        &fake_api(),
        &fake_api(),
        &DirSink::new(dir.path().join("out")),
        &cancel,
        false,
    )
    .await;

    assert!(matches!(result, Err(StatsError::Cancelled)));
    assert!(!dir.path().join("out").exists());
    Ok(())
}
