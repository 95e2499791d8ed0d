/// Run configuration.
///
/// Settings come from three layers, strongest first: command-line flags,
/// an optional JSON input file, built-in defaults. API credentials and the
/// data root come from the environment.
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::crawl::{AggregateOptions, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::{Result, StatsError};
use crate::renderer::{parse_formats, RenderFormat, DEFAULT_SORT_METRIC};
use crate::sink::SinkKind;
use crate::window::{parse_reference, ReportWindow};

pub const DATA_DIR_ENV: &str = "CRAWLER_STATS_DATA_DIR";
pub const TOKEN_ENV: &str = "APIFY_TOKEN";
pub const USER_ID_ENV: &str = "APIFY_USER_ID";
pub const BASE_URL_ENV: &str = "APIFY_API_BASE_URL";

pub const DEFAULT_DATA_DIR: &str = ".crawler-stats";
pub const DEFAULT_BASE_URL: &str = "https://api.apify.com";

/// Page sizes below this cost many requests for long histories.
const SMALL_PAGE_SIZE: usize = 100;

/// Shape of the optional `--input` JSON file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InputFile {
    pub period: Option<String>,
    pub date: Option<String>,
    pub finished_period: Option<bool>,
    pub page_size: Option<usize>,
    pub page_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub stop_on_stale_page: Option<bool>,
    pub sink: Option<SinkKind>,
    pub store_id: Option<String>,
    pub output: Option<PathBuf>,
    pub formats: Option<Vec<String>>,
    pub sort_metric: Option<String>,
}

impl InputFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StatsError::InvalidConfig(format!(
                "Failed to read input file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StatsError::InvalidConfig(format!(
                "Failed to parse input file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Flags selecting the report window.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Period kind: day, isoWeek, week or month
    #[arg(long)]
    pub period: Option<String>,

    /// Reference instant (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long)]
    pub date: Option<String>,

    /// Report the last completed period instead of the current one
    #[arg(long)]
    pub finished_period: bool,
}

impl WindowArgs {
    /// Resolves the window from flags only.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ReportWindow> {
        resolve_window_settings(
            self.period.as_deref(),
            self.date.as_deref(),
            self.finished_period,
            now,
        )
    }
}

/// Flags of the `aggregate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// JSON file with run settings; flags override it
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Executions requested per page (1..=1000)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Pause between two pages of the same crawler, in milliseconds
    #[arg(long)]
    pub page_delay_ms: Option<u64>,

    /// Number of crawlers paginated at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Abort the run after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Stop a crawler as soon as a whole page is older than the window
    #[arg(long)]
    pub stop_on_stale_page: bool,

    /// Where to store the report
    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,

    /// Key-value store id (required with --sink kv)
    #[arg(long)]
    pub store_id: Option<String>,

    /// Output directory for --sink dir
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Render formats (comma-separated: html,md)
    #[arg(long, value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// Metric the crawler sections are ordered by
    #[arg(long)]
    pub sort_metric: Option<String>,
}

/// Where the records of a run go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Dir(PathBuf),
    Sqlite,
    Kv { store_id: String },
}

/// Fully resolved settings of an `aggregate` run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub window: ReportWindow,
    pub options: AggregateOptions,
    pub sink: SinkTarget,
    pub formats: Vec<RenderFormat>,
    pub sort_metric: String,
}

impl RunConfig {
    /// Loads the input file (if any) and merges it under the flags.
    pub fn from_args(args: &AggregateArgs, now: DateTime<Utc>) -> Result<Self> {
        let input = match &args.input {
            Some(path) => InputFile::load(path)?,
            None => InputFile::default(),
        };
        Self::resolve(args, &input, now)
    }

    pub fn resolve(args: &AggregateArgs, input: &InputFile, now: DateTime<Utc>) -> Result<Self> {
        let window = resolve_window_settings(
            args.window.period.as_deref().or(input.period.as_deref()),
            args.window.date.as_deref().or(input.date.as_deref()),
            args.window.finished_period || input.finished_period.unwrap_or(false),
            now,
        )?;

        let page_size = args.page_size.or(input.page_size).unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(StatsError::InvalidConfig(format!(
                "pageSize must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        if page_size < SMALL_PAGE_SIZE {
            warn!(page_size, "Small page size, long histories will need many requests");
        }

        let concurrency = args.concurrency.or(input.concurrency).unwrap_or(1);
        if concurrency == 0 {
            return Err(StatsError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let page_delay = args
            .page_delay_ms
            .or(input.page_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PAGE_DELAY);

        let deadline = match args.deadline_secs.or(input.deadline_secs) {
            Some(0) => {
                return Err(StatsError::InvalidConfig(
                    "deadlineSecs must be at least 1".to_string(),
                ))
            }
            secs => secs.map(Duration::from_secs),
        };

        let options = AggregateOptions {
            page_size,
            page_delay,
            concurrency,
            deadline,
            stop_on_stale_page: args.stop_on_stale_page
                || input.stop_on_stale_page.unwrap_or(false),
        };

        let store_id = args.store_id.clone().or_else(|| input.store_id.clone());
        let sink = match args.sink.or(input.sink).unwrap_or_default() {
            SinkKind::Dir => SinkTarget::Dir(
                args.output
                    .clone()
                    .or_else(|| input.output.clone())
                    .unwrap_or_else(|| PathBuf::from(".")),
            ),
            SinkKind::Sqlite => SinkTarget::Sqlite,
            SinkKind::Kv => SinkTarget::Kv {
                store_id: store_id
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        StatsError::InvalidConfig("sink kv requires a storeId".to_string())
                    })?,
            },
        };

        let formats = match args.formats.as_ref().or(input.formats.as_ref()) {
            Some(names) => parse_formats(names.as_slice()),
            None => vec![RenderFormat::Html],
        };

        let sort_metric = args
            .sort_metric
            .clone()
            .or_else(|| input.sort_metric.clone())
            .unwrap_or_else(|| DEFAULT_SORT_METRIC.to_string());

        Ok(RunConfig {
            window,
            options,
            sink,
            formats,
            sort_metric,
        })
    }
}

fn resolve_window_settings(
    period: Option<&str>,
    date: Option<&str>,
    finished_period: bool,
    now: DateTime<Utc>,
) -> Result<ReportWindow> {
    let period = period.ok_or_else(|| {
        StatsError::InvalidPeriod("no period given (day, isoWeek, week, month)".to_string())
    })?;
    let reference = match date {
        Some(text) => parse_reference(text)?,
        None => now,
    };
    ReportWindow::resolve(period, reference, finished_period)
}

/// Connection settings for the hosted API.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub token: Option<String>,
    pub user_id: Option<String>,
}

impl ApiSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let raw_base = get(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&raw_base).map_err(|e| {
            StatsError::InvalidConfig(format!("Invalid {} {:?}: {}", BASE_URL_ENV, raw_base, e))
        })?;

        Ok(ApiSettings {
            base_url,
            token: get(TOKEN_ENV),
            user_id: get(USER_ID_ENV),
        })
    }
}

/// Data root: `CRAWLER_STATS_DATA_DIR` or `.crawler-stats`.
pub fn resolve_data_root() -> PathBuf {
    data_root_from(std::env::var(DATA_DIR_ENV).ok())
}

fn data_root_from(value: Option<String>) -> PathBuf {
    value
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}
