//! One fetch cycle across every configured category.
//!
//! The orchestrator owns the [`CycleState`] for the duration of a cycle. It
//! starts from a copy of the prior state, seeds categories that have never
//! been fetched, and for each category runs [`paginate`] then [`reconcile`].
//! The merged batch and the new state are returned together; persisting the
//! state and delivering the batch are left to the caller, which must do both
//! only after the cycle returned successfully.

use tracing::{Instrument, info, info_span};
use vigil_types::{CycleId, CycleState, EventCategory, EventRecord};

use crate::clock::Clock;
use crate::fetch::{FetchError, MAX_PAGE_SIZE, MAX_SKIP, PageFetcher};
use crate::first_fetch::{FirstFetch, FirstFetchError};
use crate::paginate::{PaginationSummary, paginate};
use crate::reconcile::reconcile;

/// Errors that abort a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// A page request failed after transport retries.
    #[error("fetching {category} events failed: {source}")]
    Fetch {
        /// Category being fetched when the failure occurred.
        category: EventCategory,
        /// The underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// The first-fetch time could not be resolved for seeding.
    #[error("cannot seed checkpoints: {source}")]
    FirstFetch {
        /// The underlying first-fetch error.
        #[from]
        source: FirstFetchError,
    },
}

/// Per-cycle bounds on pagination and delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    /// Records requested per page.
    pub page_size: usize,
    /// Maximum records accumulated per category per cycle.
    pub hard_cap: usize,
    /// Maximum records reconciled (and so delivered) per category per cycle.
    pub limit: usize,
}

impl FetchPlan {
    /// Plan for a scheduled fetch: full pages, full cap, `max_fetch` delivered.
    pub const fn scheduled(max_fetch: usize) -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            hard_cap: MAX_SKIP,
            limit: max_fetch,
        }
    }

    /// Plan for an on-demand query returning at most `limit` per category.
    pub fn on_demand(limit: usize) -> Self {
        Self {
            page_size: limit.clamp(1, MAX_PAGE_SIZE),
            hard_cap: limit.min(MAX_SKIP),
            limit,
        }
    }
}

/// What one category contributed to a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySummary {
    /// The category.
    pub category: EventCategory,
    /// How pagination went.
    pub pagination: PaginationSummary,
    /// Records added to the batch.
    pub delivered: usize,
    /// Records dropped as already delivered.
    pub duplicates: usize,
    /// Records dropped as older than the checkpoint.
    pub stale: usize,
    /// Records left for a later cycle by the delivery limit.
    pub deferred: usize,
    /// Whether the category's checkpoint changed.
    pub checkpoint_advanced: bool,
}

/// Result of a successful cycle.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    /// Correlation ID of the cycle.
    pub cycle_id: CycleId,
    /// Records to deliver, grouped by category in configured order, oldest
    /// first within each category.
    pub batch: Vec<EventRecord>,
    /// State to persist once the batch has been delivered.
    pub state: CycleState,
    /// One entry per configured category.
    pub summaries: Vec<CategorySummary>,
}

/// Runs fetch cycles over a fixed list of categories.
#[derive(Debug)]
pub struct CycleOrchestrator<F, C> {
    fetcher: F,
    clock: C,
    categories: Vec<EventCategory>,
    first_fetch: FirstFetch,
}

impl<F, C> CycleOrchestrator<F, C>
where
    F: PageFetcher,
    C: Clock,
{
    /// Create an orchestrator.
    ///
    /// `first_fetch` is the lower bound for categories without a checkpoint.
    pub const fn new(
        fetcher: F,
        clock: C,
        categories: Vec<EventCategory>,
        first_fetch: FirstFetch,
    ) -> Self {
        Self {
            fetcher,
            clock,
            categories,
            first_fetch,
        }
    }

    /// The page fetcher in use.
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The categories processed each cycle, in order.
    pub fn categories(&self) -> &[EventCategory] {
        &self.categories
    }

    /// Run one cycle starting from `prior`.
    ///
    /// `prior` is not modified. Categories that accumulate no records keep
    /// their checkpoint unchanged in the returned state.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Fetch`] on the first transport failure; no part
    /// of the cycle's work is returned in that case.
    pub async fn run(&self, prior: &CycleState, plan: FetchPlan) -> Result<CycleOutput, CycleError> {
        let cycle_id = CycleId::new();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.run_inner(cycle_id, prior, plan).instrument(span).await
    }

    async fn run_inner(
        &self,
        cycle_id: CycleId,
        prior: &CycleState,
        plan: FetchPlan,
    ) -> Result<CycleOutput, CycleError> {
        let mut state = prior.clone();
        self.seed(&mut state)?;

        let mut batch = Vec::new();
        let mut summaries = Vec::with_capacity(self.categories.len());

        for &category in &self.categories {
            let checkpoint = state.get(category).cloned().unwrap_or_default();
            let until = self.clock.now();

            let (records, pagination) = paginate(
                &self.fetcher,
                category,
                &checkpoint,
                until,
                plan.page_size,
                plan.hard_cap,
            )
            .await
            .map_err(|source| CycleError::Fetch { category, source })?;

            if records.is_empty() {
                info!(category = %category, stop = ?pagination.stop, "no new records");
                summaries.push(CategorySummary {
                    category,
                    pagination,
                    delivered: 0,
                    duplicates: 0,
                    stale: 0,
                    deferred: 0,
                    checkpoint_advanced: false,
                });
                continue;
            }

            let outcome = reconcile(category, &checkpoint, &records, plan.limit);
            let checkpoint_advanced = outcome.checkpoint != checkpoint;
            let delivered = outcome.delivered.len();

            batch.extend(outcome.delivered.into_iter().map(|mut record| {
                record.attach_source(category);
                record
            }));

            info!(
                category = %category,
                pages = pagination.pages,
                fetched = pagination.accumulated,
                delivered,
                duplicates = outcome.duplicates,
                stale = outcome.stale,
                deferred = outcome.deferred,
                last_timestamp = ?outcome.checkpoint.last_timestamp,
                checkpoint_ids = outcome.checkpoint.delivered_ids.len(),
                "category reconciled"
            );

            state.insert(category, outcome.checkpoint);
            summaries.push(CategorySummary {
                category,
                pagination,
                delivered,
                duplicates: outcome.duplicates,
                stale: outcome.stale,
                deferred: outcome.deferred,
                checkpoint_advanced,
            });
        }

        info!(batch = batch.len(), "cycle complete");
        Ok(CycleOutput {
            cycle_id,
            batch,
            state,
            summaries,
        })
    }

    /// Give never-fetched categories a checkpoint at the first-fetch time.
    fn seed(&self, state: &mut CycleState) -> Result<(), FirstFetchError> {
        let needs_seed = self
            .categories
            .iter()
            .any(|c| state.get(*c).and_then(|cp| cp.last_timestamp).is_none());
        if !needs_seed {
            return Ok(());
        }

        let first_fetch = self.first_fetch.resolve(self.clock.now())?;
        for category in state.seed_missing(&self.categories, first_fetch) {
            info!(category = %category, first_fetch, "first fetch, seeding checkpoint");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_plan_uses_remote_maximums() {
        let plan = FetchPlan::scheduled(1_000);
        assert_eq!(plan.page_size, 10_000);
        assert_eq!(plan.hard_cap, 50_000);
        assert_eq!(plan.limit, 1_000);
    }

    #[test]
    fn on_demand_plan_is_bounded_by_limit() {
        let plan = FetchPlan::on_demand(50);
        assert_eq!(plan, FetchPlan { page_size: 50, hard_cap: 50, limit: 50 });

        let huge = FetchPlan::on_demand(80_000);
        assert_eq!(huge.page_size, 10_000);
        assert_eq!(huge.hard_cap, 50_000);
        assert_eq!(huge.limit, 80_000);

        let zero = FetchPlan::on_demand(0);
        assert_eq!(zero.page_size, 1);
        assert_eq!(zero.hard_cap, 0);
    }
}
