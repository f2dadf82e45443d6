//! Resumable per-category cursors.
//!
//! A [`Checkpoint`] records the newest timestamp delivered for a category
//! and the IDs already delivered at exactly that timestamp. The remote only
//! filters by time, and many events can share one timestamp, so the ID set
//! is what prevents re-delivery of the events at the boundary.
//!
//! [`CycleState`] maps each category to its checkpoint. It is the only
//! state carried from one cycle to the next.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::EventCategory;
use crate::ids::EventId;

/// Cursor for one event category.
///
/// `delivered_ids` only ever holds IDs observed at exactly
/// `last_timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Newest delivered timestamp (epoch seconds), or the seeded lower bound.
    #[serde(default)]
    pub last_timestamp: Option<i64>,
    /// IDs already delivered at `last_timestamp`.
    #[serde(default)]
    pub delivered_ids: BTreeSet<EventId>,
}

impl Checkpoint {
    /// A checkpoint starting at `timestamp` with nothing delivered yet.
    pub const fn seeded(timestamp: i64) -> Self {
        Self {
            last_timestamp: Some(timestamp),
            delivered_ids: BTreeSet::new(),
        }
    }

    /// A checkpoint at `timestamp` with the given IDs already delivered.
    pub fn at(timestamp: i64, ids: impl IntoIterator<Item = EventId>) -> Self {
        Self {
            last_timestamp: Some(timestamp),
            delivered_ids: ids.into_iter().collect(),
        }
    }

    /// Whether the event `(timestamp, id)` was already delivered.
    pub fn has_delivered(&self, timestamp: i64, id: &EventId) -> bool {
        self.last_timestamp == Some(timestamp) && self.delivered_ids.contains(id)
    }
}

/// Checkpoints for every category, carried between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleState {
    checkpoints: BTreeMap<EventCategory, Checkpoint>,
}

impl CycleState {
    /// An empty state (first run).
    pub const fn new() -> Self {
        Self {
            checkpoints: BTreeMap::new(),
        }
    }

    /// The checkpoint for `category`, if one has been recorded.
    pub fn get(&self, category: EventCategory) -> Option<&Checkpoint> {
        self.checkpoints.get(&category)
    }

    /// Replace the checkpoint for `category`.
    pub fn insert(&mut self, category: EventCategory, checkpoint: Checkpoint) {
        self.checkpoints.insert(category, checkpoint);
    }

    /// Give every listed category without a timestamp a checkpoint starting
    /// at `first_fetch`.
    ///
    /// Any IDs recorded without a timestamp are dropped, since the set only
    /// has meaning at its timestamp. Returns the categories that were seeded.
    pub fn seed_missing(
        &mut self,
        categories: &[EventCategory],
        first_fetch: i64,
    ) -> Vec<EventCategory> {
        let mut seeded = Vec::new();
        for &category in categories {
            let checkpoint = self.checkpoints.entry(category).or_default();
            if checkpoint.last_timestamp.is_none() {
                *checkpoint = Checkpoint::seeded(first_fetch);
                seeded.push(category);
            }
        }
        seeded
    }

    /// Iterate over all recorded checkpoints in category order.
    pub fn iter(&self) -> impl Iterator<Item = (EventCategory, &Checkpoint)> {
        self.checkpoints.iter().map(|(c, cp)| (*c, cp))
    }

    /// Number of categories with a checkpoint.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether no checkpoint has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seed_missing_only_touches_unseeded_categories() {
        let mut state = CycleState::new();
        state.insert(EventCategory::Audit, Checkpoint::at(500, [EventId::from("a")]));

        let seeded = state.seed_missing(&[EventCategory::Audit, EventCategory::Alert], 100);

        assert_eq!(seeded, vec![EventCategory::Alert]);
        assert_eq!(
            state.get(EventCategory::Audit),
            Some(&Checkpoint::at(500, [EventId::from("a")]))
        );
        assert_eq!(state.get(EventCategory::Alert), Some(&Checkpoint::seeded(100)));
    }

    #[test]
    fn seed_clears_ids_of_timestampless_checkpoint() {
        let mut state = CycleState::new();
        state.insert(
            EventCategory::Page,
            Checkpoint {
                last_timestamp: None,
                delivered_ids: [EventId::from("p")].into_iter().collect(),
            },
        );
        state.seed_missing(&[EventCategory::Page], 7);
        assert_eq!(state.get(EventCategory::Page), Some(&Checkpoint::seeded(7)));
    }

    #[test]
    fn has_delivered_requires_matching_timestamp() {
        let checkpoint = Checkpoint::at(100, [EventId::from("a")]);
        assert!(checkpoint.has_delivered(100, &EventId::from("a")));
        assert!(!checkpoint.has_delivered(101, &EventId::from("a")));
        assert!(!checkpoint.has_delivered(100, &EventId::from("b")));
    }

    #[test]
    fn state_serializes_keyed_by_category_name() {
        let mut state = CycleState::new();
        state.insert(EventCategory::Network, Checkpoint::at(12, [EventId::from("n1")]));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "network": {"last_timestamp": 12, "delivered_ids": ["n1"]}
            })
        );
        let restored: CycleState = serde_json::from_value(json).unwrap();
        assert_eq!(restored, state);
    }
}
