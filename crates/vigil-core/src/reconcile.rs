//! Deduplication and checkpoint derivation.
//!
//! The remote filters only by time and its timestamps are whole seconds, so
//! consecutive cycles overlap on the boundary second: every event at the
//! checkpoint's timestamp comes back again. [`reconcile`] drops the ones
//! already delivered and computes the checkpoint for the next cycle.
//!
//! # Ordering
//!
//! The remote returns records newest first. The batch is reversed to oldest
//! first and then stable-sorted by timestamp, so input that violates the
//! newest-first contract still yields ascending output and a correct
//! checkpoint. Records without a timestamp sort first.
//!
//! # Checkpoint rules
//!
//! - At the checkpoint timestamp, IDs already in the checkpoint are skipped
//!   and new IDs are delivered and added to the set.
//! - At a strictly newer timestamp the record is delivered. The newest such
//!   timestamp becomes the new checkpoint, with a fresh set holding only the
//!   IDs seen at that timestamp.
//! - Strictly older than the checkpoint: already behind the cursor, skipped.
//! - No timestamp: delivered, never moves the checkpoint.
//!
//! Records are matched by [`EventRecord::dedup_key`]: the remote ID, or a
//! digest of the fields for records that carry none. The digest lands in the
//! checkpoint set like any ID.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use tracing::warn;
use vigil_types::{Checkpoint, EventCategory, EventId, EventRecord};

/// Result of reconciling one category's batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Records not delivered before, oldest first, with `event_id` attached.
    pub delivered: Vec<EventRecord>,
    /// Checkpoint to resume from next cycle.
    pub checkpoint: Checkpoint,
    /// Records dropped because they were already delivered.
    pub duplicates: usize,
    /// Records dropped because they are older than the checkpoint.
    pub stale: usize,
    /// Records not examined because `limit` was reached, left for a later
    /// cycle.
    pub deferred: usize,
}

/// Reconcile a freshly fetched batch against `checkpoint`.
///
/// `accumulated` is taken in the order the remote returned it. At most
/// `limit` records are delivered, the oldest ones first; the rest are left
/// for the next cycle, which resumes from the returned checkpoint. Skipped
/// duplicates do not count against `limit`, so a run of already-delivered
/// records at the boundary cannot starve the cycle.
///
/// The function is pure: identical inputs give identical outcomes.
pub fn reconcile(
    category: EventCategory,
    checkpoint: &Checkpoint,
    accumulated: &[EventRecord],
    limit: usize,
) -> ReconcileOutcome {
    let mut ordered: Vec<&EventRecord> = accumulated.iter().rev().collect();
    ordered.sort_by_key(|record| record.timestamp());
    let total = ordered.len();

    let boundary = checkpoint.last_timestamp;
    let mut retained = checkpoint.delivered_ids.clone();
    let mut newest: Option<(i64, BTreeSet<EventId>)> = None;
    let mut seen: HashSet<(i64, EventId)> = HashSet::new();
    let mut delivered = Vec::with_capacity(ordered.len());
    let mut duplicates = 0_usize;
    let mut stale = 0_usize;
    let mut deferred = 0_usize;

    for (index, record) in ordered.into_iter().enumerate() {
        if delivered.len() >= limit {
            deferred = total.saturating_sub(index);
            break;
        }

        let Some(timestamp) = record.timestamp() else {
            warn!(
                category = %category,
                id = ?record.id(),
                "record has no usable timestamp, forwarding without checkpointing"
            );
            delivered.push(prepared(record));
            continue;
        };

        let key = record.dedup_key();
        if !seen.insert((timestamp, key.clone())) {
            duplicates = duplicates.saturating_add(1);
            continue;
        }

        match boundary.map(|b| timestamp.cmp(&b)) {
            Some(Ordering::Less) => {
                stale = stale.saturating_add(1);
                continue;
            }
            Some(Ordering::Equal) => {
                if checkpoint.has_delivered(timestamp, &key) {
                    duplicates = duplicates.saturating_add(1);
                    continue;
                }
                retained.insert(key);
            }
            Some(Ordering::Greater) | None => match &mut newest {
                Some((newest_ts, keys)) if *newest_ts == timestamp => {
                    keys.insert(key);
                }
                _ => {
                    newest = Some((timestamp, BTreeSet::from([key])));
                }
            },
        }

        delivered.push(prepared(record));
    }

    let checkpoint = match newest {
        Some((timestamp, ids)) => Checkpoint {
            last_timestamp: Some(timestamp),
            delivered_ids: ids,
        },
        None => Checkpoint {
            last_timestamp: boundary,
            delivered_ids: retained,
        },
    };

    ReconcileOutcome {
        delivered,
        checkpoint,
        duplicates,
        stale,
        deferred,
    }
}

fn prepared(record: &EventRecord) -> EventRecord {
    let mut record = record.clone();
    record.attach_event_id();
    record
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;
    use vigil_types::record::EVENT_ID_FIELD;

    use super::*;

    fn ids(records: &[EventRecord]) -> Vec<&str> {
        records
            .iter()
            .filter_map(|r| r.id().map(EventId::as_str))
            .collect()
    }

    fn rec(id: &str, ts: i64) -> EventRecord {
        EventRecord::new(id, ts)
    }

    #[test]
    fn tie_at_checkpoint_timestamp_skips_known_ids() {
        let checkpoint = Checkpoint::at(100, [EventId::from("a")]);
        let batch = vec![rec("a", 100), rec("b", 100), rec("c", 101)];

        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 1_000);

        assert_eq!(ids(&outcome.delivered), vec!["b", "c"]);
        assert_eq!(outcome.checkpoint, Checkpoint::at(101, [EventId::from("c")]));
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let checkpoint = Checkpoint::at(100, [EventId::from("a")]);
        let batch = vec![rec("d", 103), rec("c", 101), rec("b", 100), rec("a", 100)];

        let first = reconcile(EventCategory::Page, &checkpoint, &batch, 3);
        let second = reconcile(EventCategory::Page, &checkpoint, &batch, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn newest_first_input_is_delivered_ascending() {
        let batch = vec![rec("z", 12), rec("y", 10), rec("x", 10)];
        let outcome = reconcile(EventCategory::Audit, &Checkpoint::seeded(0), &batch, 100);

        let timestamps: Vec<i64> = outcome.delivered.iter().filter_map(EventRecord::timestamp).collect();
        assert_eq!(timestamps, vec![10, 10, 12]);
        assert_eq!(outcome.checkpoint, Checkpoint::at(12, [EventId::from("z")]));
    }

    #[test]
    fn newest_timestamp_set_holds_every_id_at_that_timestamp() {
        let batch = vec![rec("c", 7), rec("b", 7), rec("a", 5)];
        let outcome = reconcile(EventCategory::Network, &Checkpoint::seeded(0), &batch, 100);
        assert_eq!(
            outcome.checkpoint,
            Checkpoint::at(7, [EventId::from("b"), EventId::from("c")])
        );
    }

    #[test]
    fn out_of_order_input_still_checkpoints_newest() {
        // Not newest-first: sorting must still find 30 as newest.
        let batch = vec![rec("m", 20), rec("n", 30), rec("o", 10), rec("p", 30)];
        let outcome = reconcile(EventCategory::Alert, &Checkpoint::seeded(0), &batch, 100);

        let timestamps: Vec<i64> = outcome.delivered.iter().filter_map(EventRecord::timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30, 30]);
        assert_eq!(
            outcome.checkpoint,
            Checkpoint::at(30, [EventId::from("n"), EventId::from("p")])
        );
    }

    #[test]
    fn limit_keeps_oldest_and_defers_the_rest() {
        let batch = vec![rec("d", 4), rec("c", 3), rec("b", 2), rec("a", 1)];
        let outcome = reconcile(EventCategory::Audit, &Checkpoint::seeded(0), &batch, 2);

        assert_eq!(ids(&outcome.delivered), vec!["a", "b"]);
        assert_eq!(outcome.checkpoint, Checkpoint::at(2, [EventId::from("b")]));
        assert_eq!(outcome.deferred, 2);
    }

    #[test]
    fn duplicates_do_not_consume_the_limit() {
        let checkpoint = Checkpoint::at(10, [EventId::from("a"), EventId::from("b")]);
        let batch = vec![rec("d", 11), rec("c", 10), rec("b", 10), rec("a", 10)];
        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 1);

        assert_eq!(ids(&outcome.delivered), vec!["c"]);
        assert_eq!(
            outcome.checkpoint,
            Checkpoint::at(10, [EventId::from("a"), EventId::from("b"), EventId::from("c")])
        );
        assert_eq!(outcome.deferred, 1);
    }

    #[test]
    fn only_known_ids_at_boundary_keeps_checkpoint() {
        let checkpoint = Checkpoint::at(100, [EventId::from("a"), EventId::from("b")]);
        let batch = vec![rec("b", 100), rec("a", 100)];
        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 100);

        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.checkpoint, checkpoint);
        assert_eq!(outcome.duplicates, 2);
    }

    #[test]
    fn new_ids_at_boundary_extend_the_set() {
        let checkpoint = Checkpoint::at(100, [EventId::from("a")]);
        let batch = vec![rec("b", 100), rec("a", 100)];
        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 100);

        assert_eq!(ids(&outcome.delivered), vec!["b"]);
        assert_eq!(
            outcome.checkpoint,
            Checkpoint::at(100, [EventId::from("a"), EventId::from("b")])
        );
    }

    #[test]
    fn records_older_than_checkpoint_are_stale() {
        let checkpoint = Checkpoint::seeded(50);
        let batch = vec![rec("new", 60), rec("old", 40)];
        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 100);

        assert_eq!(ids(&outcome.delivered), vec!["new"]);
        assert_eq!(outcome.stale, 1);
    }

    #[test]
    fn malformed_records_are_forwarded_without_moving_checkpoint() {
        let checkpoint = Checkpoint::seeded(50);
        let no_timestamp = EventRecord::from_value(json!({"_id": "nt", "user": "x"}));
        let no_id = EventRecord::from_value(json!({"timestamp": 50}));
        let batch = vec![no_id.clone(), no_timestamp];

        let outcome = reconcile(EventCategory::Audit, &checkpoint, &batch, 100);

        assert_eq!(outcome.delivered.len(), 2);
        assert_eq!(outcome.checkpoint, Checkpoint::at(50, [no_id.dedup_key()]));
        // Timestampless records sort first.
        assert_eq!(outcome.delivered[0].get(EVENT_ID_FIELD), Some(&json!("nt")));
        assert!(outcome.delivered[1].get(EVENT_ID_FIELD).is_none());
    }

    #[test]
    fn idless_record_at_boundary_is_delivered_once() {
        let no_id = EventRecord::from_value(json!({"timestamp": 12, "user": "x"}));
        let batch = vec![no_id.clone(), rec("a", 10)];

        let first = reconcile(EventCategory::Audit, &Checkpoint::seeded(0), &batch, 100);
        assert_eq!(first.delivered.len(), 2);
        assert_eq!(first.checkpoint, Checkpoint::at(12, [no_id.dedup_key()]));

        let second = reconcile(EventCategory::Audit, &first.checkpoint, &batch, 100);
        assert!(second.delivered.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.stale, 1);
        assert_eq!(second.checkpoint, first.checkpoint);
    }

    #[test]
    fn idless_records_with_different_fields_are_both_delivered() {
        let batch = vec![
            EventRecord::from_value(json!({"timestamp": 5, "user": "x"})),
            EventRecord::from_value(json!({"timestamp": 5, "user": "y"})),
        ];
        let outcome = reconcile(EventCategory::Page, &Checkpoint::seeded(0), &batch, 100);
        assert_eq!(outcome.delivered.len(), 2);
        assert_eq!(outcome.checkpoint.delivered_ids.len(), 2);
    }

    #[test]
    fn repeated_record_within_batch_is_delivered_once() {
        let batch = vec![rec("x", 9), rec("x", 9), rec("w", 8)];
        let outcome = reconcile(EventCategory::Page, &Checkpoint::seeded(0), &batch, 100);
        assert_eq!(ids(&outcome.delivered), vec!["w", "x"]);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn delivered_records_carry_event_id() {
        let outcome = reconcile(EventCategory::Audit, &Checkpoint::seeded(0), &[rec("q", 1)], 10);
        assert_eq!(outcome.delivered[0].get(EVENT_ID_FIELD), Some(&json!("q")));
    }

    #[test]
    fn empty_batch_returns_prior_checkpoint() {
        let checkpoint = Checkpoint::at(3, [EventId::from("k")]);
        let outcome = reconcile(EventCategory::Audit, &checkpoint, &[], 10);
        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.checkpoint, checkpoint);
    }
}
