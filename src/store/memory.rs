//! In-memory remote store with an attached change feed.
//!
//! Stands in for the real backend in tests and scenario construction: writes
//! go through the same contract the sync core uses in production, and each
//! write emits the change event a live feed would push. A deterministic
//! clock stamps rows so orderings are stable across runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::DateTime;
use crossbeam::channel::{Sender, unbounded};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::feed::{ChangeEvent, ChangeFeed, EventMask, FeedSubscription, SubscriptionHandle};
use crate::model::RecordId;
use crate::store::{Filter, RemoteStore, StoreError};

const CLOCK_EPOCH_MS: i64 = 1_735_689_600_000; // 2025-01-01T00:00:00Z
const CLOCK_STEP_MS: i64 = 1_000;

struct Subscriber {
    collection: String,
    mask: EventMask,
    tx: Sender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, Vec<Value>>,
    subscribers: HashMap<u64, Subscriber>,
    next_handle: u64,
    ticks: i64,
    read_error: Option<StoreError>,
    write_error: Option<StoreError>,
}

impl Inner {
    fn next_timestamp(&mut self) -> String {
        let ms = CLOCK_EPOCH_MS + self.ticks * CLOCK_STEP_MS;
        self.ticks += 1;
        DateTime::from_timestamp_millis(ms)
            .expect("deterministic clock in range")
            .to_rfc3339()
    }

    fn emit(&mut self, collection: &str, event: &ChangeEvent) {
        self.subscribers.retain(|_, sub| {
            if sub.collection != collection || !sub.mask.accepts(event.kind) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a collection without emitting feed events, as pre-existing
    /// remote state would be.
    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        let mut inner = self.lock();
        inner
            .tables
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
    }

    /// Push a synthetic event to subscribers, bypassing the tables. Lets
    /// tests exercise redelivery, partial patches, and out-of-order arrival.
    pub fn push_event(&self, collection: &str, event: ChangeEvent) {
        self.lock().emit(collection, &event);
    }

    /// Make subsequent reads fail until cleared.
    pub fn set_read_error(&self, error: Option<StoreError>) {
        self.lock().read_error = error;
    }

    /// Make subsequent writes fail until cleared.
    pub fn set_write_error(&self, error: Option<StoreError>) {
        self.lock().write_error = error;
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock")
    }
}

fn as_object(record: Value) -> Result<Map<String, Value>, StoreError> {
    match record {
        Value::Object(object) => Ok(object),
        other => Err(StoreError::permanent(format!(
            "record must be a JSON object, got {other}"
        ))),
    }
}

fn object_id(object: &Map<String, Value>) -> Option<&str> {
    object.get("id").and_then(Value::as_str)
}

impl RemoteStore for MemoryStore {
    fn read(&self, collection: &str, filter: Option<&Filter>) -> Result<Vec<Value>, StoreError> {
        let inner = self.lock();
        if let Some(err) = &inner.read_error {
            return Err(err.clone());
        }
        let rows = inner.tables.get(collection).cloned().unwrap_or_default();
        Ok(match filter {
            Some(filter) => rows.into_iter().filter(|r| filter.matches(r)).collect(),
            None => rows,
        })
    }

    fn insert(&self, collection: &str, record: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(err) = &inner.write_error {
            return Err(err.clone());
        }
        let mut object = as_object(record)?;
        if object_id(&object).is_none() {
            object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let stamp = inner.next_timestamp();
        object
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(stamp.clone()));
        object
            .entry("updated_at".to_string())
            .or_insert_with(|| Value::String(stamp));
        let row = Value::Object(object);
        inner
            .tables
            .entry(collection.to_string())
            .or_default()
            .push(row.clone());
        inner.emit(collection, &ChangeEvent::insert(row));
        Ok(())
    }

    fn update_patch(
        &self,
        collection: &str,
        id: &RecordId,
        patch: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(err) = &inner.write_error {
            return Err(err.clone());
        }
        let patch = as_object(patch)?;
        let stamp = inner.next_timestamp();
        let Some(rows) = inner.tables.get_mut(collection) else {
            return Err(StoreError::permanent(format!(
                "no collection {collection}"
            )));
        };
        let Some(row) = rows
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()))
        else {
            return Err(StoreError::permanent(format!(
                "no row {id} in {collection}"
            )));
        };
        let Some(object) = row.as_object_mut() else {
            return Err(StoreError::permanent("stored row is not an object"));
        };
        for (key, value) in patch {
            object.insert(key, value);
        }
        object.insert("updated_at".to_string(), Value::String(stamp));
        let updated = row.clone();
        inner.emit(collection, &ChangeEvent::update(updated));
        Ok(())
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(err) = &inner.write_error {
            return Err(err.clone());
        }
        let Some(rows) = inner.tables.get_mut(collection) else {
            return Ok(());
        };
        let before = rows.len();
        rows.retain(|r| r.get("id").and_then(Value::as_str) != Some(id.as_str()));
        if rows.len() < before {
            inner.emit(collection, &ChangeEvent::delete(id.clone()));
        }
        Ok(())
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(
        &self,
        collection: &str,
        mask: EventMask,
    ) -> Result<FeedSubscription, SubscriptionError> {
        let mut inner = self.lock();
        let raw = inner.next_handle;
        inner.next_handle += 1;
        let (tx, rx) = unbounded();
        inner.subscribers.insert(
            raw,
            Subscriber {
                collection: collection.to_string(),
                mask,
                tx,
            },
        );
        Ok(FeedSubscription {
            handle: SubscriptionHandle::new(raw),
            events: rx,
        })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.lock().subscribers.remove(&handle.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EventKind;

    #[test]
    fn insert_mints_id_and_timestamps() {
        let store = MemoryStore::new();
        store
            .insert("tasks", serde_json::json!({ "title": "x" }))
            .expect("insert");
        let rows = store.read("tasks", None).expect("read");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("id").and_then(Value::as_str).is_some());
        assert!(rows[0].get("created_at").and_then(Value::as_str).is_some());
    }

    #[test]
    fn writes_emit_events_until_unsubscribe() {
        let store = MemoryStore::new();
        let sub = store.subscribe("tasks", EventMask::ALL).expect("subscribe");
        store
            .insert("tasks", serde_json::json!({ "id": "t1", "title": "x" }))
            .expect("insert");
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Insert);

        store.unsubscribe(sub.handle);
        store
            .insert("tasks", serde_json::json!({ "id": "t2", "title": "y" }))
            .expect("insert");
        assert!(sub.events.try_recv().is_err());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn filtered_read_restricts_by_membership() {
        let store = MemoryStore::new();
        store.seed(
            "users",
            vec![
                serde_json::json!({ "id": "p1", "user_id": "u1", "name": "Alex" }),
                serde_json::json!({ "id": "p2", "user_id": "u2", "name": "Sam" }),
            ],
        );
        let filter = Filter::field_in("user_id", vec!["u2".to_string()]);
        let rows = store.read("users", Some(&filter)).expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Sam");
    }

    #[test]
    fn delete_of_missing_row_is_quiet() {
        let store = MemoryStore::new();
        let sub = store.subscribe("tasks", EventMask::ALL).expect("subscribe");
        store
            .delete("tasks", &RecordId::from("ghost"))
            .expect("delete");
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn injected_read_error_propagates() {
        let store = MemoryStore::new();
        store.set_read_error(Some(StoreError::retryable("gateway timeout")));
        assert!(store.read("tasks", None).is_err());
        store.set_read_error(None);
        assert!(store.read("tasks", None).is_ok());
    }
}
