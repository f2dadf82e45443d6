//! Checkpoint persistence for the Vigil event collector.
//!
//! The collector stores one [`CycleState`] between cycles. It is loaded
//! before a scheduled cycle and replaced only after the cycle's batch has
//! been accepted by the sink. Two backends are available:
//!
//! ```text
//! StateStore
//!     |
//!     +-- File      --> JSON document on local disk (FileStore)
//!     |
//!     +-- Dragonfly --> JSON string under one key (DragonflyStore)
//! ```
//!
//! # Modules
//!
//! - [`file`] -- Local JSON file with atomic replace
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) key
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod file;

pub use dragonfly::DragonflyStore;
pub use error::StoreError;
pub use file::FileStore;

use vigil_types::CycleState;

/// The configured state backend.
#[derive(Debug, Clone)]
pub enum StateStore {
    /// Local JSON file.
    File(FileStore),
    /// `Dragonfly` key.
    Dragonfly(DragonflyStore),
}

impl StateStore {
    /// Read the stored state. A backend with nothing stored yet yields an
    /// empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or holds
    /// something that is not a state.
    pub async fn load(&self) -> Result<CycleState, StoreError> {
        match self {
            Self::File(store) => store.load().await,
            Self::Dragonfly(store) => store.load().await,
        }
    }

    /// Replace the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend write fails.
    pub async fn save(&self, state: &CycleState) -> Result<(), StoreError> {
        match self {
            Self::File(store) => store.save(state).await,
            Self::Dragonfly(store) => store.save(state).await,
        }
    }

    /// Where the state lives: the file path or the `Dragonfly` key.
    pub fn location(&self) -> String {
        match self {
            Self::File(store) => store.path().display().to_string(),
            Self::Dragonfly(store) => store.key().to_owned(),
        }
    }

    /// Short backend name for log fields.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Dragonfly(_) => "dragonfly",
        }
    }
}
