//! Offset pagination for a single event category.
//!
//! The remote only exposes a time window plus an offset, so the paginator
//! walks the window page by page: each page's offset depends on the previous
//! page being full, which keeps the requests strictly sequential.

use tracing::{debug, warn};
use vigil_types::{Checkpoint, EventCategory, EventRecord};

use crate::fetch::{FetchError, MAX_PAGE_SIZE, MAX_SKIP, PageFetcher, PageRequest, PageResult};

/// Why pagination for a category ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The remote reported a non-success status.
    Rejected,
    /// A page came back with no records.
    EmptyPage,
    /// A page came back with fewer records than requested.
    ShortPage,
    /// The accumulated records reached the per-cycle hard cap.
    HardCap,
    /// The next offset would exceed [`MAX_SKIP`].
    SkipLimit,
}

/// What one pagination run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    /// Number of page requests issued.
    pub pages: usize,
    /// Records accumulated (after truncation to the hard cap).
    pub accumulated: usize,
    /// Why the run ended.
    pub stop: StopReason,
}

/// Fetch every page of `category` newer than `checkpoint`, up to `hard_cap`
/// records.
///
/// The window is `[checkpoint.last_timestamp, until]`. Records are returned
/// in the order received (newest first within each page). `page_size` is
/// clamped to `1..=MAX_PAGE_SIZE`.
///
/// # Errors
///
/// Returns the first [`FetchError`] raised by `fetcher`; records gathered
/// before the failure are discarded.
pub async fn paginate<F>(
    fetcher: &F,
    category: EventCategory,
    checkpoint: &Checkpoint,
    until: i64,
    page_size: usize,
    hard_cap: usize,
) -> Result<(Vec<EventRecord>, PaginationSummary), FetchError>
where
    F: PageFetcher,
{
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut records: Vec<EventRecord> = Vec::new();
    let mut offset = 0_usize;
    let mut pages = 0_usize;

    let stop = loop {
        if records.len() >= hard_cap {
            break StopReason::HardCap;
        }

        let request = PageRequest {
            category,
            since: checkpoint.last_timestamp,
            until,
            offset,
            page_size,
        };
        let result = fetcher.fetch(&request).await?;
        pages = pages.saturating_add(1);

        let page = match result {
            PageResult::Page(page) => page,
            PageResult::Rejected { reason } => {
                warn!(category = %category, offset, reason, "remote rejected page request");
                break StopReason::Rejected;
            }
        };

        let received = page.len();
        records.extend(page);
        debug!(
            category = %category,
            offset,
            received,
            accumulated = records.len(),
            "page received"
        );

        if received == 0 {
            break StopReason::EmptyPage;
        }
        if received < page_size {
            break StopReason::ShortPage;
        }
        if records.len() >= hard_cap {
            break StopReason::HardCap;
        }
        let next = offset.saturating_add(page_size);
        if next > MAX_SKIP {
            break StopReason::SkipLimit;
        }
        offset = next;
    };

    records.truncate(hard_cap);
    let summary = PaginationSummary {
        pages,
        accumulated: records.len(),
        stop,
    };
    Ok((records, summary))
}
