//! Cycle state kept under a single `Dragonfly` (Redis-compatible) key.
//!
//! The whole [`CycleState`] is one JSON string. A missing key is an empty
//! state.

use fred::prelude::*;
use vigil_types::CycleState;

use crate::error::StoreError;

/// Connection handle plus the key holding the state.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
    key: String,
}

impl std::fmt::Debug for DragonflyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at `url` and use `key` for the state.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        let key = key.into();
        tracing::info!(key = %key, "Connected to Dragonfly");
        Ok(Self { client, key })
    }

    /// The key holding the state.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored state, or an empty one when the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dragonfly`] if the read fails.
    /// Returns [`StoreError::Serialization`] if the value is not a state.
    pub async fn load(&self) -> Result<CycleState, StoreError> {
        let value: Option<String> = self.client.get(self.key.as_str()).await?;
        value.map_or_else(
            || {
                tracing::debug!(key = %self.key, "no stored state, starting empty");
                Ok(CycleState::new())
            },
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    /// Replace the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if serialization fails.
    /// Returns [`StoreError::Dragonfly`] if the write fails.
    pub async fn save(&self, state: &CycleState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let _: () = self
            .client
            .set(self.key.as_str(), json.as_str(), None, None, false)
            .await?;
        tracing::debug!(key = %self.key, categories = state.len(), "state saved");
        Ok(())
    }

    /// Delete the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dragonfly`] if the delete fails.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _: u32 = self.client.del(self.key.as_str()).await?;
        Ok(())
    }
}
