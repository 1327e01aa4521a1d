//! Chat messages: append-mostly, deletable, otherwise immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::{Replicated, patch_field};
use crate::model::domain::{ChatChannel, RecordId, UserId};

pub(crate) const UNKNOWN_SENDER: &str = "Unknown";

fn unknown_sender() -> String {
    UNKNOWN_SENDER.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub sender_id: UserId,
    /// Display name denormalized from the user directory; not authoritative.
    /// Remote rows never carry it, so it defaults until the join resolves.
    #[serde(default = "unknown_sender")]
    pub sender_name: String,
    pub content: String,
    pub channel: ChatChannel,
    pub created_at: DateTime<Utc>,
}

impl Replicated for Message {
    const KIND: &'static str = "message";

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn apply_patch(&mut self, patch: &Map<String, Value>) {
        patch_field(patch, "sender_id", &mut self.sender_id);
        patch_field(patch, "content", &mut self.content);
        patch_field(patch, "channel", &mut self.channel);
        // `created_at` is fixed at insert: it anchors the record's sorted
        // position, and a redelivered insert must not move the record.
    }
}

/// Input for sending a message. The store mints id and created_at.
#[derive(Clone, Debug, Serialize)]
pub struct NewMessage {
    pub content: String,
    pub channel: ChatChannel,
    pub sender_id: UserId,
}
