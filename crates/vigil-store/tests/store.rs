//! Integration tests for `vigil-store`.
//!
//! File-backend tests run everywhere. The `Dragonfly` tests require a live
//! instance and are marked `#[ignore]`. Run them with:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p vigil-store -- --ignored
//! ```

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use vigil_store::{DragonflyStore, FileStore, StateStore, StoreError};
use vigil_types::{Checkpoint, CycleState, EventCategory, EventId};

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

fn sample_state() -> CycleState {
    let mut state = CycleState::new();
    state.insert(
        EventCategory::Audit,
        Checkpoint::at(1_700_000_100, [EventId::from("c"), EventId::from("d")]),
    );
    state.insert(EventCategory::Alert, Checkpoint::seeded(1_699_000_000));
    state
}

// =============================================================================
// File backend
// =============================================================================

#[tokio::test]
async fn missing_file_loads_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::File(FileStore::new(dir.path().join("absent.json")));

    let state = store.load().await.unwrap();
    assert!(state.is_empty());
}

#[test]
fn file_location_is_the_state_path() {
    let store = StateStore::File(FileStore::new("/var/lib/vigil/state.json"));
    assert_eq!(store.backend(), "file");
    assert_eq!(store.location(), "/var/lib/vigil/state.json");
}

#[tokio::test]
async fn saved_state_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let state = sample_state();

    StateStore::File(FileStore::new(&path)).save(&state).await.unwrap();
    let loaded = StateStore::File(FileStore::new(&path)).load().await.unwrap();

    assert_eq!(loaded, state);
    assert!(!path.with_file_name("state.json.tmp").exists());
}

#[tokio::test]
async fn save_replaces_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("state.json"));

    store.save(&sample_state()).await.unwrap();
    let mut next = CycleState::new();
    next.insert(EventCategory::Page, Checkpoint::at(5, [EventId::from("p")]));
    store.save(&next).await.unwrap();

    assert_eq!(store.load().await.unwrap(), next);
}

#[tokio::test]
async fn corrupt_file_is_a_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = FileStore::new(&path).load().await.unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}

#[tokio::test]
async fn state_file_uses_category_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    FileStore::new(&path).save(&sample_state()).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["audit"]["last_timestamp"], 1_700_000_100);
    assert!(raw.get("alert").is_some());
}

// =============================================================================
// Dragonfly backend
// =============================================================================

#[tokio::test]
#[ignore = "requires live Dragonfly at localhost:6379"]
async fn dragonfly_round_trip() {
    let store = DragonflyStore::connect(DRAGONFLY_URL, "vigil:test:state")
        .await
        .expect("Failed to connect to Dragonfly -- is Docker running?");
    store.clear().await.unwrap();

    assert!(store.load().await.unwrap().is_empty());

    let state = sample_state();
    let store = StateStore::Dragonfly(store);
    assert_eq!(store.location(), "vigil:test:state");
    store.save(&state).await.unwrap();
    assert_eq!(store.load().await.unwrap(), state);

    if let StateStore::Dragonfly(inner) = store {
        inner.clear().await.unwrap();
    }
}

#[tokio::test]
async fn dragonfly_rejects_bad_url() {
    let err = DragonflyStore::connect("not a url", "k").await.unwrap_err();
    assert!(matches!(err, StoreError::Config(_)));
}
