/// The `aggregate` command: one full run from registry to sink.
///
/// Every record is rendered and serialized before the sink sees any of
/// them, so a failing run stores nothing.
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::api::ApiClient;
use crate::config::{AggregateArgs, ApiSettings, RunConfig, SinkTarget};
use crate::crawl::progress::CrawlProgress;
use crate::crawl::{aggregate, CancelFlag, CrawlerRegistry, ExecutionSource};
use crate::error::{Result, StatsError};
use crate::renderer::{self, RenderFormat};
use crate::sink::{DirSink, KvStoreSink, Record, ReportSink, SqliteStore, JSON_CONTENT_TYPE};
use crate::stats::AggregateReport;

/// Summary printed to stdout after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub report_key: String,
    pub data_location: String,
    pub page_locations: Vec<String>,
}

/// Serializes the report and renders every requested page.
///
/// The data record always comes last: sinks write in order, so a stored
/// data record means its pages are stored too.
pub fn build_records(
    report: &AggregateReport,
    formats: &[RenderFormat],
    sort_metric: &str,
) -> Result<Vec<Record>> {
    let data = report
        .to_json()
        .map_err(|e| StatsError::Render(format!("{:#}", e)))?;

    let mut records = Vec::with_capacity(formats.len() + 1);
    for format in formats {
        let page = renderer::render(report, *format, sort_metric)?;
        records.push(Record::new(
            report.window.page_key(format.extension()),
            format.content_type(),
            page,
        ));
    }
    records.push(Record::new(report.window.data_key(), JSON_CONTENT_TYPE, data));
    Ok(records)
}

/// Runs the aggregation for `config` and stores the result in `sink`.
pub async fn execute<R, S>(
    config: &RunConfig,
    registry: &R,
    source: &S,
    sink: &dyn ReportSink,
    cancel: &CancelFlag,
    show_progress: bool,
) -> Result<RunOutput>
where
    R: CrawlerRegistry + ?Sized,
    S: ExecutionSource + ?Sized,
{
    let window = &config.window;
    info!(
        window = %window.key,
        from = %window.from,
        to = %window.to,
        "Starting aggregation"
    );

    let crawlers = registry.list_crawlers().await?;
    info!(crawlers = crawlers.len(), "Listed crawlers");

    let progress = if show_progress {
        CrawlProgress::new(crawlers.len())
    } else {
        CrawlProgress::hidden()
    };

    let report = aggregate(window, &crawlers, source, &config.options, cancel, &progress).await?;
    let records = build_records(&report, &config.formats, &config.sort_metric)?;

    let mut page_locations = sink.put_records(&records).await?;
    let data_location = page_locations.pop().ok_or_else(|| {
        StatsError::Sink("Sink returned no location for the data record".to_string())
    })?;

    Ok(RunOutput {
        from: window.from,
        to: window.to,
        report_key: window.key.clone(),
        data_location,
        page_locations,
    })
}

/// Opens the configured sink; a key-value store must already exist.
async fn open_sink(
    target: &SinkTarget,
    settings: &ApiSettings,
    data_root: &Path,
) -> Result<Box<dyn ReportSink>> {
    Ok(match target {
        SinkTarget::Dir(path) => Box::new(DirSink::new(path.clone())),
        SinkTarget::Sqlite => Box::new(SqliteStore::init(data_root)?),
        SinkTarget::Kv { store_id } => {
            let sink = KvStoreSink::new(settings, store_id)?;
            sink.verify().await?;
            Box::new(sink)
        }
    })
}

/// Entry point of the `aggregate` subcommand.
pub async fn run(
    args: &AggregateArgs,
    data_root: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<RunOutput> {
    let config = RunConfig::from_args(args, Utc::now()).context("Invalid run configuration")?;
    let settings = ApiSettings::from_env()?;
    let client = ApiClient::new(&settings)?;
    let sink = open_sink(&config.sink, &settings, data_root).await?;

    let output = execute(&config, &client, &client, sink.as_ref(), cancel, true)
        .await
        .with_context(|| format!("Aggregation of {} failed", config.window.key))?;

    info!(
        report = %output.report_key,
        data = %output.data_location,
        pages = output.page_locations.len(),
        "Report stored"
    );
    Ok(output)
}
