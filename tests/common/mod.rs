#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use boardsync::store::MemoryStore;
use boardsync::{Config, DataFacade};

pub fn facade_with(store: &Arc<MemoryStore>, config: Config) -> DataFacade {
    DataFacade::new(store.clone(), store.clone(), config)
}

pub fn facade(store: &Arc<MemoryStore>) -> DataFacade {
    facade_with(store, Config::default())
}

pub fn task_row(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "progress": 0,
        "priority": "medium",
        "created_at": "2025-01-01T00:00:00+00:00",
        "updated_at": "2025-01-01T00:00:00+00:00",
    })
}

pub fn subtask_row(id: &str, task_id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "task_id": task_id,
        "title": title,
        "completed": false,
        "priority": "medium",
        "created_at": "2025-01-01T00:00:00+00:00",
        "updated_at": "2025-01-01T00:00:00+00:00",
    })
}

pub fn user_row(id: &str, user_id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "name": name,
        "email": format!("{user_id}@example.com"),
        "created_at": "2025-01-01T00:00:00+00:00",
    })
}

pub fn role_row(id: &str, user_id: &str, role: &str) -> Value {
    json!({ "id": id, "user_id": user_id, "role": role })
}

pub fn message_row(id: &str, sender_id: &str, content: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "sender_id": sender_id,
        "content": content,
        "channel": "team",
        "created_at": created_at,
    })
}
