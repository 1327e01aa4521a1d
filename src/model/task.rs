//! Work items and their sub-items.
//!
//! Sub-items are physically replicated as an independent collection keyed by
//! `task_id`, but logically owned by their parent task: the visible
//! projection always nests them under `subtasks`.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::merge::{Replicated, patch_field};
use crate::model::domain::{Priority, RecordId, UserId};

fn de_progress<'de, D: Deserializer<'de>>(de: D) -> Result<u8, D::Error> {
    let raw = i64::deserialize(de)?;
    Ok(clamp_progress(raw))
}

fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Completion percentage, clamped to 0..=100 on parse.
    #[serde(default, deserialize_with = "de_progress")]
    pub progress: u8,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignees: BTreeSet<UserId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Attached sub-items, insertion-ordered. Never present in a remote row
    /// payload; maintained entirely by the replica.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Replicated for Task {
    const KIND: &'static str = "task";

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &Map<String, Value>) {
        patch_field(patch, "title", &mut self.title);
        patch_field(patch, "description", &mut self.description);
        if let Some(raw) = patch.get("progress").and_then(Value::as_i64) {
            self.progress = clamp_progress(raw);
        }
        patch_field(patch, "start_date", &mut self.start_date);
        patch_field(patch, "due_date", &mut self.due_date);
        patch_field(patch, "assignees", &mut self.assignees);
        patch_field(patch, "priority", &mut self.priority);
        patch_field(patch, "created_by", &mut self.created_by);
        patch_field(patch, "updated_at", &mut self.updated_at);
        // `subtasks` is deliberately untouched: it is not a remote column.
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: RecordId,
    pub task_id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignees: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Replicated for Subtask {
    const KIND: &'static str = "subtask";

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &Map<String, Value>) {
        patch_field(patch, "task_id", &mut self.task_id);
        patch_field(patch, "title", &mut self.title);
        patch_field(patch, "description", &mut self.description);
        patch_field(patch, "completed", &mut self.completed);
        patch_field(patch, "priority", &mut self.priority);
        patch_field(patch, "due_date", &mut self.due_date);
        patch_field(patch, "assignees", &mut self.assignees);
        patch_field(patch, "updated_at", &mut self.updated_at);
    }
}

/// Input for creating a task. The store mints id and timestamps.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub assignees: BTreeSet<UserId>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

/// Partial update for a task; only the fields set are written remotely.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<BTreeSet<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SubtaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<BTreeSet<UserId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_row() -> Value {
        serde_json::json!({
            "id": "t1",
            "title": "Design review",
            "progress": 40,
            "priority": "high",
            "assignees": ["u1", "u2"],
            "created_at": "2026-01-10T09:00:00Z",
            "updated_at": "2026-01-10T09:00:00Z",
        })
    }

    #[test]
    fn task_parses_with_optional_fields_absent() {
        let task: Task = serde_json::from_value(task_row()).expect("parse");
        assert_eq!(task.title, "Design review");
        assert_eq!(task.progress, 40);
        assert!(task.description.is_none());
        assert!(task.subtasks.is_empty());
        assert_eq!(task.assignees.len(), 2);
    }

    #[test]
    fn progress_is_clamped_on_parse() {
        let mut row = task_row();
        row["progress"] = serde_json::json!(250);
        let task: Task = serde_json::from_value(row).expect("parse");
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn patch_preserves_absent_fields_and_subtasks() {
        let mut task: Task = serde_json::from_value(task_row()).expect("parse");
        task.subtasks.push(Subtask {
            id: RecordId::from("s1"),
            task_id: RecordId::from("t1"),
            title: "Collect feedback".into(),
            description: None,
            completed: false,
            priority: Priority::Medium,
            due_date: None,
            assignees: BTreeSet::new(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        });

        let patch = serde_json::json!({ "id": "t1", "progress": 60 });
        task.apply_patch(patch.as_object().expect("object"));

        assert_eq!(task.progress, 60);
        assert_eq!(task.title, "Design review");
        assert_eq!(task.subtasks.len(), 1);
    }

    #[test]
    fn new_task_serializes_without_unset_options() {
        let input = NewTask {
            title: "Ship it".into(),
            priority: Priority::Low,
            ..NewTask::default()
        };
        let value = serde_json::to_value(&input).expect("serialize");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("description"));
        assert!(!object.contains_key("due_date"));
        assert_eq!(object["priority"], "low");
    }
}
