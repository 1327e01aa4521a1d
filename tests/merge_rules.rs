//! Merge-rule properties observed through a live replica: idempotence,
//! last-write-wins field merge, unknown-id no-ops, and total snapshot
//! replacement.

mod common;

use std::sync::Arc;

use boardsync::store::MemoryStore;
use boardsync::{ChangeEvent, RecordId, RemoteStore};
use common::*;

#[test]
fn redelivered_insert_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    let row = task_row("t1", "once");
    store.push_event("tasks", ChangeEvent::insert(row.clone()));
    store.push_event("tasks", ChangeEvent::insert(row));
    facade.pump();
    assert_eq!(facade.tasks().len(), 1);
}

#[test]
fn duplicate_message_insert_applies_update_style() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m1", "u1", "first", "2025-01-01T00:00:00+00:00")),
    );
    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m1", "u1", "second", "2025-01-01T00:00:00+00:00")),
    );
    facade.pump();

    let messages = facade.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "second");
}

#[test]
fn update_before_insert_is_dropped_not_synthesized() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event(
        "tasks",
        ChangeEvent::update(serde_json::json!({ "id": "ghost", "title": "too early" })),
    );
    facade.pump();
    assert!(facade.tasks().is_empty());
}

#[test]
fn delete_for_unknown_id_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "stays")]);
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event("tasks", ChangeEvent::delete(RecordId::from("ghost")));
    facade.pump();
    assert_eq!(facade.tasks().len(), 1);
}

#[test]
fn event_sequence_merges_last_write_wins_per_field() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event("tasks", ChangeEvent::insert(task_row("t1", "v1")));
    store.push_event(
        "tasks",
        ChangeEvent::update(serde_json::json!({ "id": "t1", "progress": 50 })),
    );
    store.push_event(
        "tasks",
        ChangeEvent::update(serde_json::json!({ "id": "t1", "title": "v3" })),
    );
    facade.pump();

    let task = &facade.tasks()[0];
    assert_eq!(task.title, "v3");
    assert_eq!(task.progress, 50);
}

#[test]
fn snapshot_replace_is_total() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "old"), task_row("t2", "old")]);
    let mut facade = facade(&store);
    facade.start().expect("start");
    assert_eq!(facade.tasks().len(), 2);

    // Remote churn, then refetch without pumping the feed: the result must
    // be exactly the new remote state, not a mix.
    store
        .delete("tasks", &RecordId::from("t1"))
        .expect("delete");
    store
        .insert("tasks", task_row("t3", "new"))
        .expect("insert");
    facade.refetch_tasks().expect("refetch");

    let ids: Vec<&str> = facade.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t2", "t3"]);
}

#[test]
fn message_order_stays_sorted_under_out_of_order_arrival() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m2", "u1", "later", "2025-01-01T00:02:00+00:00")),
    );
    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m1", "u1", "earlier", "2025-01-01T00:01:00+00:00")),
    );
    facade.pump();

    let contents: Vec<&str> = facade.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["earlier", "later"]);
}

#[test]
fn redelivered_insert_cannot_reorder_messages() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m1", "u1", "first", "2025-01-01T00:01:00+00:00")),
    );
    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m2", "u1", "second", "2025-01-01T00:02:00+00:00")),
    );
    facade.pump();

    // Redelivery with a bumped stamp: content merges update-style, but the
    // record keeps its original stamp and position.
    store.push_event(
        "messages",
        ChangeEvent::insert(message_row("m1", "u1", "revised", "2025-01-01T00:03:00+00:00")),
    );
    facade.pump();

    let messages = facade.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, RecordId::from("m1"));
    assert_eq!(messages[0].content, "revised");
    let stamps: Vec<_> = messages.iter().map(|m| m.created_at).collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);
}

#[test]
fn malformed_insert_payload_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    // No title, no timestamps: cannot materialize a full task.
    store.push_event("tasks", ChangeEvent::insert(serde_json::json!({ "id": "t1" })));
    facade.pump();
    assert!(facade.tasks().is_empty());
}
