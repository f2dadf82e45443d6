//! Event records as received from the remote API.
//!
//! The remote returns each event as a loosely-typed JSON object. An
//! [`EventRecord`] keeps every field exactly as received and additionally
//! extracts the two fields the collector depends on: the remote identifier
//! (`_id`) and the event timestamp in epoch seconds (`timestamp`).
//!
//! Extraction is best-effort. A record whose identifier or timestamp is
//! missing or unusable is still a valid [`EventRecord`]; it simply reports
//! `None` for the affected accessor and is forwarded without the derived
//! fields that depend on it. A record without an identifier is recognized
//! across batches by [`EventRecord::dedup_key`], a digest of its fields.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::enums::EventCategory;
use crate::ids::EventId;

/// Field holding the remote-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// Field holding the event time in epoch seconds.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Derived field: stable copy of the identifier.
pub const EVENT_ID_FIELD: &str = "event_id";

/// Derived field: the category the record was fetched under.
pub const SOURCE_FIELD: &str = "source_log_event";

/// Derived field: normalized event time as an ISO 8601 UTC string.
pub const TIME_FIELD: &str = "_time";

/// Field used to wrap a record that was not a JSON object.
pub const RAW_FIELD: &str = "raw";

/// Prefix of the key derived for records without an identifier.
pub const FINGERPRINT_PREFIX: &str = "sha256:";

/// A single event record.
///
/// Serializes to (and deserializes from) the flat JSON object it was built
/// from, including any derived fields attached before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct EventRecord {
    id: Option<EventId>,
    timestamp: Option<i64>,
    fields: Map<String, Value>,
}

impl EventRecord {
    /// Build a well-formed record with the given identifier and timestamp.
    pub fn new(id: impl Into<EventId>, timestamp: i64) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_owned(), Value::String(id.as_str().to_owned()));
        fields.insert(TIMESTAMP_FIELD.to_owned(), Value::from(timestamp));
        Self {
            id: Some(id),
            timestamp: Some(timestamp),
            fields,
        }
    }

    /// Build a record from an arbitrary JSON value.
    ///
    /// Objects are taken as-is. Any other value is kept under [`RAW_FIELD`]
    /// so that it still reaches the sink.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::from(fields),
            other => {
                let mut fields = Map::new();
                fields.insert(RAW_FIELD.to_owned(), other);
                Self::from(fields)
            }
        }
    }

    /// Add or replace a field, returning the record.
    ///
    /// Setting [`ID_FIELD`] or [`TIMESTAMP_FIELD`] re-runs extraction.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// The remote identifier, if present and usable.
    pub const fn id(&self) -> Option<&EventId> {
        self.id.as_ref()
    }

    /// The event time in epoch seconds, if present and usable.
    pub const fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Whether the identifier or the timestamp could not be extracted.
    pub const fn is_malformed(&self) -> bool {
        self.id.is_none() || self.timestamp.is_none()
    }

    /// Key identifying the record for deduplication.
    ///
    /// The remote identifier when present. Otherwise `sha256:` followed by
    /// the hex digest of the fields serialized in key order, so the same
    /// event served again yields the same key.
    pub fn dedup_key(&self) -> EventId {
        self.id.clone().unwrap_or_else(|| self.fingerprint())
    }

    fn fingerprint(&self) -> EventId {
        let ordered: BTreeMap<&String, &Value> = self.fields.iter().collect();
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&ordered).unwrap_or_default());
        EventId::new(format!("{FINGERPRINT_PREFIX}{}", hex::encode(hasher.finalize())))
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, as received plus any derived fields.
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Copy the identifier into [`EVENT_ID_FIELD`].
    ///
    /// Does nothing when the identifier is absent.
    pub fn attach_event_id(&mut self) {
        if let Some(id) = &self.id {
            self.fields
                .insert(EVENT_ID_FIELD.to_owned(), Value::String(id.as_str().to_owned()));
        }
    }

    /// Attach the category tag and, when the timestamp is known, the
    /// normalized event time.
    pub fn attach_source(&mut self, category: EventCategory) {
        self.fields.insert(
            SOURCE_FIELD.to_owned(),
            Value::String(category.as_str().to_owned()),
        );
        if let Some(time) = self.timestamp.and_then(normalized_time) {
            self.fields.insert(TIME_FIELD.to_owned(), Value::String(time));
        }
    }

    fn insert(&mut self, key: &str, value: Value) {
        match key {
            ID_FIELD => self.id = coerce_id(&value),
            TIMESTAMP_FIELD => self.timestamp = coerce_timestamp(&value),
            _ => {}
        }
        self.fields.insert(key.to_owned(), value);
    }
}

impl From<Map<String, Value>> for EventRecord {
    fn from(fields: Map<String, Value>) -> Self {
        let id = fields.get(ID_FIELD).and_then(coerce_id);
        let timestamp = fields.get(TIMESTAMP_FIELD).and_then(coerce_timestamp);
        Self {
            id,
            timestamp,
            fields,
        }
    }
}

impl From<EventRecord> for Map<String, Value> {
    fn from(record: EventRecord) -> Self {
        record.fields
    }
}

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SS.000Z`.
///
/// Returns `None` when the value is outside the range `chrono` can represent.
pub fn normalized_time(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S.000Z").to_string())
}

fn coerce_id(value: &Value) -> Option<EventId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(EventId::new(s.as_str())),
        Value::Number(n) => Some(EventId::new(n.to_string())),
        _ => None,
    }
}

fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_seconds)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_seconds))
        }
        _ => None,
    }
}

/// Truncate fractional seconds, rejecting values that do not fit an `i64`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate_seconds(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}
