//! Shared type definitions for the Vigil event collector.
//!
//! This crate is the single source of truth for the values that flow between
//! the collector's engine, its persistence layer, and the runner binary.
//!
//! # Modules
//!
//! - [`ids`] -- Remote event identifiers and per-cycle correlation IDs
//! - [`enums`] -- Event categories and API dialects
//! - [`record`] -- The [`EventRecord`] type validated at the API boundary
//! - [`checkpoint`] -- Per-category [`Checkpoint`] and the [`CycleState`] map

pub mod checkpoint;
pub mod enums;
pub mod ids;
pub mod record;

// Re-export all public types at crate root for convenience.
pub use checkpoint::{Checkpoint, CycleState};
pub use enums::{ApiVersion, EventCategory, ParseEnumError};
pub use ids::{CycleId, EventId};
pub use record::EventRecord;
