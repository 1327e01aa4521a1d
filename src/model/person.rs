//! User directory entries and their role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::{Replicated, patch_field};
use crate::model::domain::{RecordId, Role, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub representative: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Denormalized from the role-assignment collection; `client` when no
    /// assignment exists. Remote directory rows never carry it.
    #[serde(default)]
    pub role: Role,
}

impl Replicated for Person {
    const KIND: &'static str = "person";

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &Map<String, Value>) {
        patch_field(patch, "user_id", &mut self.user_id);
        patch_field(patch, "name", &mut self.name);
        patch_field(patch, "email", &mut self.email);
        patch_field(patch, "avatar", &mut self.avatar);
        patch_field(patch, "contact", &mut self.contact);
        patch_field(patch, "representative", &mut self.representative);
        // `role` lives in its own collection and is merged from role events;
        // `created_at` is fixed at insert.
    }
}

/// One row of the role-assignment collection.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RoleAssignment {
    /// Assignment rows read without projection carry their own id; snapshot
    /// projections may omit it.
    #[serde(default)]
    pub id: Option<RecordId>,
    pub user_id: UserId,
    pub role: Role,
}
