//! Error types for state persistence.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! I/O, [`fred`] and [`serde_json`] errors with the location that failed.

use std::path::PathBuf;

/// Errors that can occur while loading or saving cycle state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the state file failed.
    #[error("state file {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// Stored state is not valid JSON for a `CycleState`.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
