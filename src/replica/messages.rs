//! Message family replica.
//!
//! Messages are append-mostly and immutable after insert, so the merge only
//! handles insert and delete; update events are logged and ignored. The
//! visible sequence stays non-decreasing by `created_at` even when the feed
//! delivers out of order, because inserts are placed by sort position rather
//! than blindly appended.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{CollectionNames, Config};
use crate::error::{LoadError, MutationError};
use crate::feed::{ChangeEvent, ChangeFeed, EventKind, EventMask, FeedSubscription};
use crate::join::JoinResolver;
use crate::merge::{
    MergeOutcome, Replicated, find_mut, materialize, remove_row, row_id, upsert_row_at,
};
use crate::model::{ChatChannel, Message, NewMessage, RecordId, UserId};
use crate::replica::{SnapshotVersion, missing_payload, to_record};
use crate::store::{Filter, RemoteStore};

pub struct MessageReplica {
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
    resolver: Arc<JoinResolver>,
    collections: CollectionNames,
    messages: Vec<Message>,
    loading: bool,
    version: SnapshotVersion,
    sub: Option<FeedSubscription>,
}

impl MessageReplica {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        feed: Arc<dyn ChangeFeed>,
        resolver: Arc<JoinResolver>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            feed,
            resolver,
            collections: config.collections.clone(),
            messages: Vec::new(),
            loading: true,
            version: SnapshotVersion::default(),
            sub: None,
        }
    }

    pub fn start(&mut self) -> crate::Result<()> {
        if self.sub.is_none() {
            self.sub = Some(
                self.feed
                    .subscribe(&self.collections.messages, EventMask::ALL)?,
            );
        }
        self.refetch()
    }

    pub fn refetch(&mut self) -> crate::Result<()> {
        let messages = self.load_snapshot()?;
        self.messages = messages;
        self.loading = false;
        self.version = self.version.bump();
        debug!(
            collection = %self.collections.messages,
            version = self.version.get(),
            rows = self.messages.len(),
            "snapshot installed"
        );
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Vec<Message>, LoadError> {
        let rows = self
            .store
            .read(&self.collections.messages, None)
            .map_err(|cause| LoadError {
                collection: self.collections.messages.clone(),
                cause,
            })?;

        let mut messages: Vec<Message> = Vec::new();
        for row in &rows {
            match materialize::<Message>(row) {
                Ok(msg) => messages.push(msg),
                Err(anomaly) => MergeOutcome::Dropped(anomaly).absorb(&self.collections.messages),
            }
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        // One-time name lookup over the distinct senders present, restricted
        // to exactly those ids. A failure here degrades names to "Unknown"
        // rather than failing the whole snapshot.
        let sender_ids: BTreeSet<&UserId> = messages.iter().map(|m| &m.sender_id).collect();
        if !sender_ids.is_empty() {
            let filter = Filter::field_in(
                "user_id",
                sender_ids.iter().map(|id| id.as_str().to_string()).collect(),
            );
            match self.store.read(&self.collections.users, Some(&filter)) {
                Ok(user_rows) => {
                    self.resolver.seed_names(user_rows.iter().filter_map(name_entry));
                }
                Err(err) => {
                    warn!(%err, "sender name lookup failed, messages will show Unknown");
                }
            }
        }
        for msg in &mut messages {
            msg.sender_name = self.resolver.resolve_sender_name(&msg.sender_id);
        }
        Ok(messages)
    }

    pub fn pump(&mut self) {
        if self.loading {
            return;
        }
        let events: Vec<ChangeEvent> = self
            .sub
            .as_ref()
            .map(FeedSubscription::drain)
            .unwrap_or_default();
        for event in events {
            let outcome = self.apply_event(event);
            outcome.absorb(&self.collections.messages);
        }
    }

    fn apply_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        match event.kind {
            EventKind::Insert => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Message::KIND);
                };
                let outcome = upsert_row_at(&mut self.messages, row, |rows, msg: &Message| {
                    rows.partition_point(|m| m.created_at <= msg.created_at)
                });
                if outcome.applied() {
                    // The push payload never carries the denormalized name;
                    // resolve it from the directory index before the record
                    // is visible.
                    if let Some(id) = row.as_object().and_then(row_id) {
                        if let Some(msg) = find_mut(&mut self.messages, &id) {
                            msg.sender_name = self.resolver.resolve_sender_name(&msg.sender_id);
                        }
                    }
                }
                outcome
            }
            EventKind::Update => {
                // Messages are immutable once inserted; the feed should not
                // produce these.
                debug!(collection = %self.collections.messages, "ignoring update for immutable message");
                MergeOutcome::Applied
            }
            EventKind::Delete => {
                let Some(id) = event.old_id else {
                    return missing_payload(Message::KIND);
                };
                remove_row(&mut self.messages, &id)
            }
        }
    }

    /// Full visible sequence, ordered by `created_at`.
    pub fn list(&self) -> &[Message] {
        &self.messages
    }

    pub fn in_channel(&self, channel: ChatChannel) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.channel == channel)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn send_message(
        &self,
        content: &str,
        channel: ChatChannel,
        sender_id: &UserId,
    ) -> Result<(), MutationError> {
        let record = to_record(&NewMessage {
            content: content.to_string(),
            channel,
            sender_id: sender_id.clone(),
        })?;
        self.store
            .insert(&self.collections.messages, record)
            .map_err(MutationError::from)
    }

    pub fn delete_message(&self, id: &RecordId) -> Result<(), MutationError> {
        self.store
            .delete(&self.collections.messages, id)
            .map_err(MutationError::from)
    }

    pub fn shutdown(&mut self) {
        if let Some(sub) = self.sub.take() {
            self.feed.unsubscribe(sub.handle);
        }
    }
}

impl Drop for MessageReplica {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn name_entry(row: &Value) -> Option<(UserId, String)> {
    let user_id = row.get("user_id").and_then(Value::as_str)?;
    let name = row.get("name").and_then(Value::as_str)?;
    Some((UserId::from(user_id), name.to_string()))
}
