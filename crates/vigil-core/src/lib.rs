//! Incremental fetch engine for the Vigil event collector.
//!
//! The engine pulls events for several categories from a remote API that only
//! supports time-window plus offset pagination, drops events that were already
//! delivered in a previous cycle, and computes the checkpoint the next cycle
//! resumes from.
//!
//! ```text
//! CycleOrchestrator --(per category)--> paginate --> PageFetcher (remote)
//!        |                                  |
//!        |<-- delivered + checkpoint <-- reconcile
//! ```
//!
//! # Modules
//!
//! - [`clock`] -- [`Clock`] seam for "now" in epoch seconds.
//! - [`config`] -- Configuration loading from `vigil-config.yaml`.
//! - [`cycle`] -- [`CycleOrchestrator`] running one cycle over all categories.
//! - [`fetch`] -- [`PageFetcher`] trait, page requests and results.
//! - [`first_fetch`] -- Parsing of the configured first-fetch lower bound.
//! - [`paginate`] -- Offset pagination for a single category.
//! - [`reconcile`] -- Deduplication and checkpoint derivation.
//!
//! The engine never persists state and never delivers events: it is a
//! function of `(categories, prior state)` to `(batch, new state)`, and the
//! caller decides what to do with both.
//!
//! [`Clock`]: clock::Clock
//! [`CycleOrchestrator`]: cycle::CycleOrchestrator
//! [`PageFetcher`]: fetch::PageFetcher

pub mod clock;
pub mod config;
pub mod cycle;
pub mod fetch;
pub mod first_fetch;
pub mod paginate;
pub mod reconcile;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cycle::{CategorySummary, CycleError, CycleOrchestrator, CycleOutput, FetchPlan};
pub use fetch::{FetchError, MAX_PAGE_SIZE, MAX_SKIP, PageFetcher, PageRequest, PageResult};
pub use first_fetch::{FirstFetch, FirstFetchError};
pub use paginate::{PaginationSummary, StopReason, paginate};
pub use reconcile::{ReconcileOutcome, reconcile};
