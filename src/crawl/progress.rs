/// Progress reporting UI for aggregation runs.
///
/// Handles progress bar creation, updates, and result display.
/// Can operate in TTY mode (with animated spinners) or non-TTY mode (text logging).
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;

use super::types::StopReason;

/// Maximum width for crawler names in progress display.
const CRAWLER_NAME_WIDTH: usize = 32;

/// Snapshot handed to the progress callback after each page.
#[derive(Clone, Copy, Debug)]
pub struct PageProgress {
    pub offset: usize,
    pub total_count: usize,
    pub in_window: u64,
}

/// Type alias for progress callback function.
pub type ProgressCallback = Box<dyn Fn(&PageProgress) + Send + Sync>;

/// Truncates a string to a maximum width with middle ellipsis if needed.
///
/// # Examples
/// - "Short name" (10 chars) → "Short name" padded to the width
/// - "A very long crawler name exceeding it" (limit 20) → "A very lo…ceeding it"
fn truncate_middle(s: &str, max_width: usize) -> String {
    // Count characters, not bytes: names may contain multi-byte Unicode.
    let char_count = s.chars().count();
    if char_count <= max_width {
        format!("{:<width$}", s, width = max_width)
    } else {
        let ellipsis = "…";
        let ellipsis_len = ellipsis.chars().count();
        if max_width <= ellipsis_len {
            let truncated: String = s.chars().take(max_width).collect();
            format!("{:<width$}", truncated, width = max_width)
        } else {
            let available = max_width - ellipsis_len;
            let start_len = available.div_ceil(2);
            let end_len = available / 2;
            let start: String = s.chars().take(start_len).collect();
            let end: String = s.chars().skip(char_count - end_len).collect();
            format!("{}{}{}", start, ellipsis, end)
        }
    }
}

/// Formats a finished crawler on a single line.
///
/// Example output:
/// `my-shop-crawler                    42 executions, 3 pages (reached older executions)`
pub fn format_completed_crawler(
    name: &str,
    in_window: u64,
    pages_fetched: usize,
    stop_reason: StopReason,
) -> String {
    let truncated_name = truncate_middle(name, CRAWLER_NAME_WIDTH);
    let reason = match stop_reason {
        StopReason::EmptyPage => "end of history",
        StopReason::OlderThanWindow => "reached older executions",
        StopReason::StalePage => "page older than window",
        StopReason::SourceExhausted => "all executions read",
    };
    let pages = if pages_fetched == 1 { "page" } else { "pages" };

    if in_window == 0 {
        format!(
            "{} {:>5} executions in window, skipped ({} {}, {})",
            truncated_name, 0, pages_fetched, pages, reason
        )
    } else {
        format!(
            "{} {:>5} executions, {} {} ({})",
            truncated_name, in_window, pages_fetched, pages, reason
        )
    }
}

/// Progress tracking for a whole aggregation run.
///
/// Manages the overall progress bar and creates crawler-level spinners.
/// Handles both TTY (animated) and non-TTY (silent) modes transparently.
#[derive(Clone)]
pub struct CrawlProgress {
    multi: Option<MultiProgress>,
    overall: Option<ProgressBar>,
    is_tty: bool,
}

impl CrawlProgress {
    /// Creates progress bars for a run over `total_crawlers` crawlers.
    ///
    /// If stderr is a TTY, creates animated progress bars.
    /// Otherwise, progress is reported via text output only.
    pub fn new(total_crawlers: usize) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::hidden();
        }

        let mp = MultiProgress::new();
        let overall = mp.add(ProgressBar::new(total_crawlers as u64));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} crawlers ({percent}%)")
        {
            overall.set_style(style.progress_chars("█▓░"));
        }
        CrawlProgress {
            multi: Some(mp),
            overall: Some(overall),
            is_tty: true,
        }
    }

    /// Progress that never draws anything.
    pub fn hidden() -> Self {
        CrawlProgress {
            multi: None,
            overall: None,
            is_tty: false,
        }
    }

    /// Creates a progress callback for a single crawler's paging loop.
    ///
    /// Returns a tuple of (callback, optional_spinner).
    /// The spinner (if present) should be finished when the crawler completes.
    pub fn make_callback(&self, crawler_name: String) -> (ProgressCallback, Option<ProgressBar>) {
        let Some(ref mp) = self.multi else {
            let callback: ProgressCallback = Box::new(|_progress: &PageProgress| {});
            return (callback, None);
        };

        let pb = if let Some(ref overall_bar) = self.overall {
            mp.insert_before(overall_bar, ProgressBar::new_spinner())
        } else {
            mp.add(ProgressBar::new_spinner())
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message(crawler_name.clone());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let pb_for_cb = pb.clone();
        let truncated_name = truncate_middle(&crawler_name, CRAWLER_NAME_WIDTH);
        let callback: ProgressCallback = Box::new(move |progress: &PageProgress| {
            pb_for_cb.set_message(format!(
                "{} {:>5} in window, offset {}/{}",
                truncated_name, progress.in_window, progress.offset, progress.total_count
            ));
        });
        (callback, Some(pb))
    }

    /// Increments the overall progress bar.
    pub fn inc(&self) {
        if let Some(ref overall) = self.overall {
            overall.inc(1);
        }
    }

    /// Finishes and hides the overall progress bar.
    pub fn finish(&self) {
        if let Some(ref overall) = self.overall {
            overall.finish_and_clear();
        }
    }

    /// Print a line without breaking/redrawing the progress bars.
    /// Uses `MultiProgress::println` when available, otherwise falls back to `eprintln!`.
    pub fn println(&self, msg: &str) {
        if let Some(ref mp) = self.multi {
            let _ = mp.println(msg);
        } else if self.is_tty {
            eprintln!("{}", msg);
        } else {
            tracing::info!("{}", msg);
        }
    }
}
