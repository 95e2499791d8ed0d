/// The `render` command: re-render a stored report file.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::renderer::{self, parse_formats};
use crate::sink::{DirSink, Record, ReportSink};
use crate::stats::AggregateReport;

/// Loads and validates `report_path`, then writes one page per format into `output_dir`.
///
/// Returns the written file paths.
pub async fn run(
    report_path: &Path,
    formats: &[String],
    output_dir: Option<PathBuf>,
    sort_metric: &str,
) -> Result<Vec<String>> {
    let report = AggregateReport::load_and_validate(report_path)?;
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));

    let mut records = Vec::new();
    for format in parse_formats(formats) {
        let page = renderer::render(&report, format, sort_metric)
            .with_context(|| format!("Failed to render {} page", format.extension()))?;
        records.push(Record::new(
            report.window.page_key(format.extension()),
            format.content_type(),
            page,
        ));
    }

    let locations = DirSink::new(&output_dir)
        .put_records(&records)
        .await
        .with_context(|| format!("Failed to write pages to {}", output_dir.display()))?;

    for location in &locations {
        eprintln!("Report written to: {}", location);
    }
    Ok(locations)
}
