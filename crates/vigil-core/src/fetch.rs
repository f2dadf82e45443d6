//! The page-fetch seam between the engine and the remote API.
//!
//! A [`PageFetcher`] performs exactly one bounded request for one category
//! and returns the page as received. It knows nothing about checkpoints or
//! caps; the paginator decides which offsets to ask for and when to stop.
//!
//! Two outcomes are deliberately kept apart:
//!
//! - [`PageResult::Rejected`]: the remote answered but reported a
//!   non-success status. This ends pagination for the category and is not
//!   an error.
//! - [`FetchError`]: the request itself failed after the transport's own
//!   retries. This aborts the whole cycle.

use std::future::Future;

use vigil_types::{EventCategory, EventRecord};

/// Largest page the remote will return for one request.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Largest cumulative offset the remote accepts.
pub const MAX_SKIP: usize = 50_000;

/// Parameters of a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Category to fetch.
    pub category: EventCategory,
    /// Inclusive lower bound of the window, epoch seconds.
    pub since: Option<i64>,
    /// Upper bound of the window, epoch seconds.
    pub until: i64,
    /// Number of records to skip.
    pub offset: usize,
    /// Maximum number of records to return.
    pub page_size: usize,
}

/// Outcome of a page request that reached the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// Records in the order the remote returned them (newest first).
    Page(Vec<EventRecord>),
    /// The remote reported a non-success status.
    Rejected {
        /// Whatever the remote said about the failure.
        reason: String,
    },
}

/// A page request failed outright.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network or HTTP failure after the transport exhausted its retries.
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport {
        /// How many attempts were made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// The response body could not be decoded at all.
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Issues one page request against the remote API.
///
/// Implementations must not retry beyond what their transport already
/// does, and must report a remote non-success status as
/// [`PageResult::Rejected`] rather than as an error.
pub trait PageFetcher {
    /// Fetch a single page.
    fn fetch(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<PageResult, FetchError>> + Send;
}
