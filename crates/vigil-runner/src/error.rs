//! Error types for the `vigil` binary.
//!
//! Uses `thiserror` for typed errors that surface through every command:
//! configuration, HTTP client setup, the fetch cycle, state persistence and
//! sink delivery.

use vigil_core::config::ConfigError;
use vigil_core::{CycleError, FetchError};
use vigil_store::StoreError;

/// Errors that can occur while running a command.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client or a request URL could not be built.
    #[error("client setup error: {0}")]
    Client(String),

    /// The fetch cycle failed.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Loading or saving checkpoint state failed.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// The sink did not accept the batch.
    #[error("sink error: {0}")]
    Sink(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// An HTTP exchange that failed after the transport gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (after {attempts} attempt(s))")]
pub struct TransportError {
    /// How many attempts were made.
    pub attempts: u32,
    /// Description of the last failure.
    pub message: String,
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            attempts: err.attempts,
            message: err.message,
        }
    }
}
