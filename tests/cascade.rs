//! Task/subtask projection: grouping, cascade on parent delete, orphan
//! adoption, and re-homing.

mod common;

use std::sync::Arc;

use boardsync::config::Limits;
use boardsync::store::MemoryStore;
use boardsync::{ChangeEvent, Config, Priority, RecordId};
use common::*;

#[test]
fn parent_delete_drops_its_subtasks_in_one_step() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "parent")]);
    store.seed("subtasks", vec![subtask_row("s1", "t1", "child")]);
    let mut facade = facade(&store);
    facade.start().expect("start");
    assert_eq!(facade.tasks()[0].subtasks.len(), 1);

    store.push_event("tasks", ChangeEvent::delete(RecordId::from("t1")));
    facade.pump();

    assert!(facade.tasks().is_empty());
    assert!(facade.subtasks_of(&RecordId::from("t1")).is_empty());
}

#[test]
fn subtask_delete_touches_only_its_parent() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "parent")]);
    store.seed(
        "subtasks",
        vec![subtask_row("s1", "t1", "keep"), subtask_row("s2", "t1", "drop")],
    );
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event("subtasks", ChangeEvent::delete(RecordId::from("s2")));
    facade.pump();

    let task = &facade.tasks()[0];
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtasks[0].id, RecordId::from("s1"));
}

#[test]
fn orphan_is_hidden_until_its_parent_arrives() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event("subtasks", ChangeEvent::insert(subtask_row("s1", "t9", "early")));
    facade.pump();
    assert!(facade.tasks().is_empty());

    store.push_event("tasks", ChangeEvent::insert(task_row("t9", "late parent")));
    facade.pump();

    let task = &facade.tasks()[0];
    assert_eq!(task.id, RecordId::from("t9"));
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtasks[0].title, "early");
}

#[test]
fn snapshot_orphans_are_adopted_too() {
    let store = Arc::new(MemoryStore::new());
    // Subtask present at snapshot time, parent only arrives via the feed.
    store.seed("subtasks", vec![subtask_row("s1", "t1", "waiting")]);
    let mut facade = facade(&store);
    facade.start().expect("start");
    assert!(facade.tasks().is_empty());

    store.push_event("tasks", ChangeEvent::insert(task_row("t1", "parent")));
    facade.pump();
    assert_eq!(facade.tasks()[0].subtasks.len(), 1);
}

#[test]
fn parent_delete_clears_pending_orphans() {
    let store = Arc::new(MemoryStore::new());
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event("subtasks", ChangeEvent::insert(subtask_row("s1", "t1", "pending")));
    facade.pump();
    store.push_event("tasks", ChangeEvent::delete(RecordId::from("t1")));
    facade.pump();
    // Parent arriving after its own delete must not resurrect the orphan.
    store.push_event("tasks", ChangeEvent::insert(task_row("t1", "reborn")));
    facade.pump();

    assert_eq!(facade.tasks().len(), 1);
    assert!(facade.tasks()[0].subtasks.is_empty());
}

#[test]
fn orphan_bucket_evicts_oldest_parent_past_the_cap() {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        limits: Limits {
            max_orphan_subtasks: 1,
        },
        ..Config::default()
    };
    let mut facade = facade_with(&store, config);
    facade.start().expect("start");

    store.push_event("subtasks", ChangeEvent::insert(subtask_row("s1", "t1", "first")));
    store.push_event("subtasks", ChangeEvent::insert(subtask_row("s2", "t2", "second")));
    facade.pump();
    store.push_event("tasks", ChangeEvent::insert(task_row("t1", "evicted parent")));
    store.push_event("tasks", ChangeEvent::insert(task_row("t2", "kept parent")));
    facade.pump();

    let t1 = facade.subtasks_of(&RecordId::from("t1"));
    let t2 = facade.subtasks_of(&RecordId::from("t2"));
    assert!(t1.is_empty(), "evicted orphan must not reappear");
    assert_eq!(t2.len(), 1);
}

#[test]
fn subtask_update_rehomes_when_task_id_changes() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "from"), task_row("t2", "to")]);
    store.seed("subtasks", vec![subtask_row("s1", "t1", "mover")]);
    let mut facade = facade(&store);
    facade.start().expect("start");

    store.push_event(
        "subtasks",
        ChangeEvent::update(serde_json::json!({ "id": "s1", "task_id": "t2" })),
    );
    facade.pump();

    assert!(facade.subtasks_of(&RecordId::from("t1")).is_empty());
    let moved = facade.subtasks_of(&RecordId::from("t2"));
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].title, "mover");
}

#[test]
fn add_subtask_defaults_to_medium_priority() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "parent")]);
    let mut facade = facade(&store);
    facade.start().expect("start");

    facade
        .add_subtask(&RecordId::from("t1"), "quick item")
        .expect("add_subtask");
    facade.pump();

    let subs = facade.subtasks_of(&RecordId::from("t1"));
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].priority, Priority::Medium);
    assert!(!subs[0].completed);
}

#[test]
fn toggle_subtask_round_trips_through_the_store() {
    let store = Arc::new(MemoryStore::new());
    store.seed("tasks", vec![task_row("t1", "parent")]);
    store.seed("subtasks", vec![subtask_row("s1", "t1", "flip me")]);
    let mut facade = facade(&store);
    facade.start().expect("start");
    assert!(!facade.tasks()[0].subtasks[0].completed);

    facade
        .toggle_subtask(&RecordId::from("s1"), false)
        .expect("toggle");
    facade.pump();
    assert!(facade.tasks()[0].subtasks[0].completed);
}
