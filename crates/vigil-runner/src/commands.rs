//! The `fetch`, `get-events` and `test` commands.
//!
//! Every command runs one cycle of the engine over the stored state. Only
//! `fetch` writes state back, and only once the sink has accepted the
//! batch: a failure anywhere before that leaves the previous state in place
//! and the next run fetches the same window again.

use tracing::{debug, info};
use vigil_core::config::{CollectorConfig, ConfigError, SinkKind, StateBackend, StateConfig};
use vigil_core::{CycleOrchestrator, CycleOutput, FetchPlan, FirstFetch, SystemClock};
use vigil_store::{DragonflyStore, FileStore, StateStore};
use vigil_types::EventRecord;

use crate::cli::GetEventsArgs;
use crate::client::ApiClient;
use crate::error::RunnerError;
use crate::sink::EventSink;

/// Everything a command needs: the engine wired to the remote API, and the
/// state store.
#[derive(Debug)]
pub struct Collector {
    config: CollectorConfig,
    orchestrator: CycleOrchestrator<ApiClient, SystemClock>,
    store: StateStore,
}

impl Collector {
    /// Wire up the collector from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the API client cannot be built or the state
    /// backend is unreachable.
    pub async fn new(config: CollectorConfig) -> Result<Self, RunnerError> {
        let client = ApiClient::new(&config.api)?;
        let first_fetch =
            FirstFetch::parse(&config.fetch.first_fetch).map_err(|e| ConfigError::Invalid {
                reason: format!("fetch.first_fetch: {e}"),
            })?;
        let store = open_store(&config.state).await?;
        let api_version = client.version();

        let orchestrator = CycleOrchestrator::new(
            client,
            SystemClock,
            config.fetch.categories.clone(),
            first_fetch,
        );
        info!(
            api_version = %api_version,
            categories = ?orchestrator.categories(),
            state_backend = store.backend(),
            state_location = %store.location(),
            sink = ?config.sink.kind,
            "collector ready"
        );
        Ok(Self {
            config,
            orchestrator,
            store,
        })
    }

    /// Scheduled cycle: fetch up to `max_fetch` per category, deliver, then
    /// save the new state.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if fetching, delivery or saving fails. State
    /// is untouched unless the batch was delivered.
    pub async fn fetch(&self) -> Result<CycleOutput, RunnerError> {
        let sink = EventSink::connect(&self.config.sink, &self.config.api).await?;
        let prior = self.store.load().await?;
        debug!(categories = prior.len(), "state loaded");

        let output = self
            .orchestrator
            .run(&prior, FetchPlan::scheduled(self.config.fetch.max_fetch))
            .await?;

        sink.deliver(&output.batch).await?;
        self.store.save(&output.state).await?;

        info!(
            cycle_id = %output.cycle_id,
            events = output.batch.len(),
            state_backend = self.store.backend(),
            state_location = %self.store.location(),
            "fetch complete, state saved"
        );
        Ok(output)
    }

    /// On-demand query of up to `limit` events per category. Optionally
    /// delivers them; never saves state.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if fetching or delivery fails.
    pub async fn get_events(&self, args: &GetEventsArgs) -> Result<Vec<EventRecord>, RunnerError> {
        let prior = self.store.load().await?;
        let output = self
            .orchestrator
            .run(&prior, FetchPlan::on_demand(args.limit))
            .await?;

        if args.should_push() {
            if self.config.sink.kind == SinkKind::Stdout {
                debug!("stdout sink, events are printed instead of pushed");
            } else {
                let sink = EventSink::connect(&self.config.sink, &self.config.api).await?;
                sink.deliver(&output.batch).await?;
            }
        }

        info!(cycle_id = %output.cycle_id, events = output.batch.len(), "get-events complete");
        Ok(output.batch)
    }

    /// Connectivity check: one on-demand cycle bounded by `max_fetch`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the remote cannot be queried.
    pub async fn test(&self) -> Result<(), RunnerError> {
        let prior = self.store.load().await?;
        let output = self
            .orchestrator
            .run(&prior, FetchPlan::on_demand(self.config.fetch.max_fetch))
            .await?;
        info!(cycle_id = %output.cycle_id, events = output.batch.len(), "test cycle succeeded");
        Ok(())
    }
}

async fn open_store(config: &StateConfig) -> Result<StateStore, RunnerError> {
    Ok(match config.backend {
        StateBackend::File => StateStore::File(FileStore::new(&config.path)),
        StateBackend::Dragonfly => StateStore::Dragonfly(
            DragonflyStore::connect(&config.dragonfly_url, config.key.clone()).await?,
        ),
    })
}
