/// Core paging decision logic.
///
/// Classifies executions against the report window and decides, after each
/// page, whether a crawler's history needs another page.
use super::types::{ExecutionRecord, PageSummary, Placement, StopReason};
use crate::window::ReportWindow;

/// What the paging loop does after a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagingDecision {
    Continue { next_offset: usize },
    Stop(StopReason),
}

/// Places an execution relative to the window (inclusive on both ends).
pub fn classify(window: &ReportWindow, execution: &ExecutionRecord) -> Placement {
    let Some(finished_at) = execution.finished_at else {
        return Placement::Unfinished;
    };

    if finished_at < window.from {
        Placement::BeforeWindow
    } else if finished_at > window.to {
        Placement::AfterWindow
    } else {
        Placement::InWindow
    }
}

/// Decides whether to fetch another page.
///
/// # Decision Logic
///
/// Evaluated in priority order:
/// 1. the page was empty;
/// 2. the before-window executions seen so far reach the reported total,
///    so nothing further back can be in the window;
/// 3. with `stop_on_stale_page`, every execution on this page was older
///    than the window;
/// 4. the next offset would be at or past the reported total.
///
/// Otherwise the next page starts at `offset + page_size`.
pub fn decide_after_page(page: &PageSummary, stop_on_stale_page: bool) -> PagingDecision {
    if page.item_count == 0 {
        return PagingDecision::Stop(StopReason::EmptyPage);
    }

    if page.before_so_far >= page.total_count {
        return PagingDecision::Stop(StopReason::OlderThanWindow);
    }

    if stop_on_stale_page && page.before_on_page == page.item_count {
        return PagingDecision::Stop(StopReason::StalePage);
    }

    let next_offset = page.offset.saturating_add(page.page_size);
    if next_offset >= page.total_count {
        return PagingDecision::Stop(StopReason::SourceExhausted);
    }

    PagingDecision::Continue { next_offset }
}
