//! Change-feed contract: typed insert/update/delete notifications pushed per
//! collection, delivered over a channel owned by the subscriber.

use crossbeam::channel::Receiver;
use serde_json::{Map, Value};

use crate::error::SubscriptionError;
use crate::model::RecordId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

/// One change notification. Insert/update carry the row (or for updates,
/// possibly only the changed fields); delete carries only the old id.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub new: Option<Value>,
    pub old_id: Option<RecordId>,
}

impl ChangeEvent {
    pub fn insert(row: Value) -> Self {
        Self {
            kind: EventKind::Insert,
            new: Some(row),
            old_id: None,
        }
    }

    pub fn update(row: Value) -> Self {
        Self {
            kind: EventKind::Update,
            new: Some(row),
            old_id: None,
        }
    }

    pub fn delete(old_id: RecordId) -> Self {
        Self {
            kind: EventKind::Delete,
            new: None,
            old_id: Some(old_id),
        }
    }

    /// The payload as a JSON object, when present and object-shaped.
    pub fn row(&self) -> Option<&Map<String, Value>> {
        self.new.as_ref().and_then(Value::as_object)
    }
}

/// Which event kinds a subscription wants delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: Self = Self {
        insert: true,
        update: true,
        delete: true,
    };

    pub fn accepts(self, kind: EventKind) -> bool {
        match kind {
            EventKind::Insert => self.insert,
            EventKind::Update => self.update,
            EventKind::Delete => self.delete,
        }
    }
}

/// Token identifying one live subscription, used to release its channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A live subscription: events queue in the channel from the moment
/// `subscribe` returns, which is what closes the snapshot/event race -- a
/// replica subscribes first, loads its snapshot, then drains the backlog.
pub struct FeedSubscription {
    pub handle: SubscriptionHandle,
    pub events: Receiver<ChangeEvent>,
}

impl FeedSubscription {
    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Push-subscription source. Delivery is at-least-once; ordering is
/// preserved only within one collection's subscription.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(
        &self,
        collection: &str,
        mask: EventMask,
    ) -> Result<FeedSubscription, SubscriptionError>;

    /// Release the underlying channel. After this returns, a later
    /// re-subscribe must not observe duplicate or stale deliveries.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
