//! Merge of change events into a replica collection.
//!
//! The rules absorb everything an at-least-once, out-of-order feed can throw
//! at them: a duplicate insert applies update-style instead of duplicating, an
//! update for an unknown id is dropped rather than synthesized from a partial
//! patch, and a delete for an unknown id is a no-op. Anomalies are routine
//! here, so they are logged, never returned as errors.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::RecordId;

/// A record that can live in a replica collection: identified by row id,
/// materializable from a full row, and patchable field-by-field.
pub trait Replicated: Clone + DeserializeOwned {
    /// Short noun for log lines ("task", "message", ...).
    const KIND: &'static str;

    fn record_id(&self) -> &RecordId;

    /// Overwrite only the fields present in `patch`, preserving the rest.
    fn apply_patch(&mut self, patch: &Map<String, Value>);
}

/// Non-fatal oddity observed while merging. Observable via logs only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeAnomaly {
    /// Insert for an id we already hold (redelivery); applied update-style.
    DuplicateInsert { kind: &'static str, id: RecordId },
    /// Update arrived before the insert/snapshot that would make it apply.
    UnknownUpdate { kind: &'static str, id: RecordId },
    UnknownDelete { kind: &'static str, id: RecordId },
    /// Sub-item referencing a parent that is not (yet) known.
    OrphanSubtask { id: RecordId, task_id: RecordId },
    /// Payload missing or not materializable into a full record.
    MalformedRow { kind: &'static str, reason: String },
}

impl fmt::Display for MergeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeAnomaly::DuplicateInsert { kind, id } => {
                write!(f, "duplicate {kind} insert for {id}")
            }
            MergeAnomaly::UnknownUpdate { kind, id } => {
                write!(f, "{kind} update for unknown id {id}")
            }
            MergeAnomaly::UnknownDelete { kind, id } => {
                write!(f, "{kind} delete for unknown id {id}")
            }
            MergeAnomaly::OrphanSubtask { id, task_id } => {
                write!(f, "subtask {id} references unknown task {task_id}")
            }
            MergeAnomaly::MalformedRow { kind, reason } => {
                write!(f, "malformed {kind} row: {reason}")
            }
        }
    }
}

/// What one merge step did with one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// Applied, but the delivery itself was anomalous (e.g. duplicate insert).
    AppliedWith(MergeAnomaly),
    /// The event had no effect on the collection.
    Dropped(MergeAnomaly),
}

impl MergeOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied | MergeOutcome::AppliedWith(_))
    }

    /// Log and discard. Malformed payloads are surprising enough to warn on;
    /// the rest are expected feed noise.
    pub fn absorb(self, collection: &str) {
        match self {
            MergeOutcome::Applied => {}
            MergeOutcome::AppliedWith(anomaly) | MergeOutcome::Dropped(anomaly) => match anomaly {
                MergeAnomaly::MalformedRow { .. } => warn!(collection, %anomaly, "merge anomaly"),
                _ => debug!(collection, %anomaly, "merge anomaly"),
            },
        }
    }
}

/// Extract the primary key from a row payload.
pub fn row_id(row: &Map<String, Value>) -> Option<RecordId> {
    row.get("id").and_then(Value::as_str).map(RecordId::from)
}

/// Materialize a full record from an insert payload.
pub fn materialize<R: Replicated>(row: &Value) -> Result<R, MergeAnomaly> {
    serde_json::from_value(row.clone()).map_err(|err| MergeAnomaly::MalformedRow {
        kind: R::KIND,
        reason: err.to_string(),
    })
}

pub fn find_mut<'a, R: Replicated>(rows: &'a mut [R], id: &RecordId) -> Option<&'a mut R> {
    rows.iter_mut().find(|r| r.record_id() == id)
}

/// INSERT rule: append when absent (at the position `place` chooses), apply
/// update-style when the id is already held.
pub fn upsert_row_at<R: Replicated>(
    rows: &mut Vec<R>,
    row: &Value,
    place: impl FnOnce(&[R], &R) -> usize,
) -> MergeOutcome {
    let Some(object) = row.as_object() else {
        return MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
            kind: R::KIND,
            reason: "payload is not an object".into(),
        });
    };
    let Some(id) = row_id(object) else {
        return MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
            kind: R::KIND,
            reason: "payload has no id".into(),
        });
    };
    if let Some(existing) = find_mut(rows, &id) {
        existing.apply_patch(object);
        return MergeOutcome::AppliedWith(MergeAnomaly::DuplicateInsert { kind: R::KIND, id });
    }
    match materialize::<R>(row) {
        Ok(record) => {
            let at = place(rows, &record).min(rows.len());
            rows.insert(at, record);
            MergeOutcome::Applied
        }
        Err(anomaly) => MergeOutcome::Dropped(anomaly),
    }
}

/// INSERT rule with append placement.
pub fn upsert_row<R: Replicated>(rows: &mut Vec<R>, row: &Value) -> MergeOutcome {
    upsert_row_at(rows, row, |current, _| current.len())
}

/// UPDATE rule: shallow-merge the fields present in the payload onto the
/// existing record; drop silently when the id is unknown.
pub fn patch_row<R: Replicated>(rows: &mut [R], row: &Value) -> MergeOutcome {
    let Some(object) = row.as_object() else {
        return MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
            kind: R::KIND,
            reason: "payload is not an object".into(),
        });
    };
    let Some(id) = row_id(object) else {
        return MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
            kind: R::KIND,
            reason: "payload has no id".into(),
        });
    };
    match find_mut(rows, &id) {
        Some(existing) => {
            existing.apply_patch(object);
            MergeOutcome::Applied
        }
        None => MergeOutcome::Dropped(MergeAnomaly::UnknownUpdate { kind: R::KIND, id }),
    }
}

/// DELETE rule: remove by id if present; absent is a no-op.
pub fn remove_row<R: Replicated>(rows: &mut Vec<R>, id: &RecordId) -> MergeOutcome {
    let before = rows.len();
    rows.retain(|r| r.record_id() != id);
    if rows.len() < before {
        MergeOutcome::Applied
    } else {
        MergeOutcome::Dropped(MergeAnomaly::UnknownDelete {
            kind: R::KIND,
            id: id.clone(),
        })
    }
}

/// Overwrite `slot` when `key` is present in the patch and parses; a value
/// that fails to parse is skipped rather than clobbering good state.
pub fn patch_field<T: DeserializeOwned>(patch: &Map<String, Value>, key: &str, slot: &mut T) {
    if let Some(value) = patch.get(key) {
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => *slot = parsed,
            Err(err) => warn!(key, %err, "skipping unparseable field in patch"),
        }
    }
}
