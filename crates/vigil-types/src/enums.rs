//! Enumeration types for the event collector.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Event categories
// ---------------------------------------------------------------------------

/// A distinct class of event record, fetched and checkpointed independently.
///
/// The declaration order is the order categories are processed in a cycle
/// when the configuration does not list them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Administrative audit trail.
    Audit,
    /// Web page visits.
    Page,
    /// Network-level connection events.
    Network,
    /// Cloud application activity.
    Application,
    /// Policy, DLP and watch-list alerts.
    Alert,
}

impl EventCategory {
    /// Every category the remote API serves, in processing order.
    pub const ALL: [Self; 5] = [
        Self::Audit,
        Self::Page,
        Self::Network,
        Self::Application,
        Self::Alert,
    ];

    /// The wire name of the category.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audit => "audit",
            Self::Page => "page",
            Self::Network => "network",
            Self::Application => "application",
            Self::Alert => "alert",
        }
    }
}

impl core::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError {
                kind: "event category",
                value: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// API dialects
// ---------------------------------------------------------------------------

/// Version of the remote REST API.
///
/// The two versions differ in URL layout, authentication, and the
/// response envelope, but serve the same event categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// Token in the query string, JSON request body, `status`/`data` envelope.
    V1,
    /// Token in a header, query parameters, `ok`/`result` envelope.
    #[default]
    V2,
}

impl ApiVersion {
    /// The path segment used in the base URL (`/api/{version}/`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl core::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            _ => Err(ParseEnumError {
                kind: "API version",
                value: s.to_owned(),
            }),
        }
    }
}
