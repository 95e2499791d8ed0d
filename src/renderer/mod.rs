/// Report rendering.
///
/// Both renderers work from the same `ReportView`, so the Markdown and HTML
/// pages always show the same numbers in the same order.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

use crate::error::Result;
use crate::stats::{AggregateReport, CrawlerReport, MetricValue, StatsMap};
use crate::timefmt::{format_day, format_instant};

pub mod html;
pub mod md;

/// Metric the crawler sections are ordered by when none is configured.
pub const DEFAULT_SORT_METRIC: &str = "pagesCrawled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Html,
    #[value(name = "md", alias = "markdown")]
    #[serde(rename = "md", alias = "markdown")]
    Markdown,
}

impl RenderFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RenderFormat::Html => "html",
            RenderFormat::Markdown => "md",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            RenderFormat::Html => "text/html; charset=utf-8",
            RenderFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "html" => Some(RenderFormat::Html),
            "md" | "markdown" => Some(RenderFormat::Markdown),
            _ => None,
        }
    }
}

/// Parses format names, skipping unknown ones with a warning.
///
/// Duplicates are dropped. If nothing usable remains, HTML is rendered.
pub fn parse_formats<S: AsRef<str>>(names: &[S]) -> Vec<RenderFormat> {
    let mut formats = Vec::new();
    for name in names {
        match RenderFormat::from_name(name.as_ref()) {
            Some(format) if !formats.contains(&format) => formats.push(format),
            Some(_) => {}
            None => warn!(format = name.as_ref(), "Ignoring unknown render format"),
        }
    }
    if formats.is_empty() {
        formats.push(RenderFormat::Html);
    }
    formats
}

/// Renders `report` in `format`, ordering crawlers by `sort_metric`.
pub fn render(report: &AggregateReport, format: RenderFormat, sort_metric: &str) -> Result<String> {
    let view = ReportView::build(report, sort_metric);
    match format {
        RenderFormat::Html => html::render(&view),
        RenderFormat::Markdown => Ok(md::render(&view)),
    }
}

// ============================================================================
// View model
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub status: String,
    pub count: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagView {
    pub tag: String,
    pub executions: String,
    /// One cell per entry of the crawler's `metric_names`
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlerView {
    pub id: String,
    pub name: String,
    pub executions: String,
    pub statuses: Vec<StatusRow>,
    pub metrics: Vec<MetricRow>,
    pub metric_names: Vec<String>,
    pub tags: Vec<TagView>,
}

/// Display-ready report: numbers formatted, crawlers sorted.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub key: String,
    pub period: String,
    pub from: String,
    pub to: String,
    pub from_day: String,
    pub to_day: String,
    pub executions: String,
    pub crawlers_count: String,
    pub sort_metric: String,
    pub totals: Vec<MetricRow>,
    pub crawlers: Vec<CrawlerView>,
}

impl ReportView {
    pub fn build(report: &AggregateReport, sort_metric: &str) -> Self {
        let crawlers = sorted_crawlers(report, sort_metric)
            .into_iter()
            .map(|(id, crawler)| crawler_view(id, crawler))
            .collect();

        ReportView {
            key: report.window.key.clone(),
            period: report.window.period_kind.to_string(),
            from: format_instant(&report.window.from),
            to: format_instant(&report.window.to),
            from_day: format_day(&report.window.from),
            to_day: format_day(&report.window.to),
            executions: format_number(report.totals.executions_count as i64),
            crawlers_count: format_number(report.crawlers_count as i64),
            sort_metric: sort_metric.to_string(),
            totals: metric_rows(&report.totals.stats),
            crawlers,
        }
    }
}

/// Crawlers by `sort_metric` descending; crawlers without it go last.
/// Ties keep report order.
fn sorted_crawlers<'a>(
    report: &'a AggregateReport,
    sort_metric: &str,
) -> Vec<(&'a String, &'a CrawlerReport)> {
    let mut crawlers: Vec<_> = report.crawlers.iter().collect();
    crawlers.sort_by(|(_, a), (_, b)| {
        match (a.stats.get(sort_metric), b.stats.get(sort_metric)) {
            (Some(x), Some(y)) => y.as_f64().partial_cmp(&x.as_f64()).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    crawlers
}

fn crawler_view(id: &str, crawler: &CrawlerReport) -> CrawlerView {
    let metric_names: Vec<String> = crawler.stats.keys().cloned().collect();
    let tags = crawler
        .by_tag
        .iter()
        .map(|(tag, bucket)| TagView {
            tag: tag.clone(),
            executions: format_number(bucket.executions_count as i64),
            values: metric_names
                .iter()
                .map(|name| format_metric(bucket.stats.get(name).unwrap_or_default()))
                .collect(),
        })
        .collect();

    CrawlerView {
        id: id.to_string(),
        name: crawler.custom_id.clone().unwrap_or_else(|| id.to_string()),
        executions: format_number(crawler.executions_total as i64),
        statuses: crawler
            .executions_by_status
            .iter()
            .map(|(status, count)| StatusRow {
                status: status.clone(),
                count: format_number(*count as i64),
            })
            .collect(),
        metrics: metric_rows(&crawler.stats),
        metric_names,
        tags,
    }
}

fn metric_rows(stats: &StatsMap) -> Vec<MetricRow> {
    stats
        .iter()
        .map(|(name, value)| MetricRow {
            name: name.clone(),
            value: format_metric(*value),
        })
        .collect()
}

/// Groups digits in threes: `1234567` -> `1,234,567`.
pub fn format_number(n: i64) -> String {
    let is_negative = n < 0;
    // unsigned_abs handles i64::MIN
    let abs_str = n.unsigned_abs().to_string();
    let mut grouped_rev = String::new();

    for (count, ch) in abs_str.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            grouped_rev.push(',');
        }
        grouped_rev.push(ch);
    }

    let mut formatted: String = grouped_rev.chars().rev().collect();
    if is_negative {
        formatted.insert(0, '-');
    }
    formatted
}

/// Integers are grouped; floats get two decimals.
pub fn format_metric(value: MetricValue) -> String {
    match value {
        MetricValue::Int(i) => format_number(i),
        MetricValue::Float(f) if !f.is_finite() => f.to_string(),
        MetricValue::Float(f) => {
            let rounded = format!("{:.2}", f.abs());
            let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));
            let grouped = int_part
                .parse::<i64>()
                .map(format_number)
                .unwrap_or_else(|_| int_part.to_string());
            let sign = if f < 0.0 && rounded != "0.00" { "-" } else { "" };
            format!("{}{}.{}", sign, grouped, frac_part)
        }
    }
}
