//! Replica managers: one per entity family, each owning a snapshot loader,
//! its change-feed subscriptions, and the merged in-memory collection.
//!
//! All managers follow the same lifecycle: subscribe first, then load. The
//! subscription channel buffers anything pushed while the bulk read runs, and
//! `pump` refuses to merge until a snapshot has installed, so an event can
//! neither be lost to the load race nor shown before its collection is
//! validated. Mutations write through the remote store and never touch local
//! state; the change event round-trips instead.

mod messages;
mod tasks;
mod users;

use serde_json::Value;

use crate::error::MutationError;
use crate::merge::{MergeAnomaly, MergeOutcome};
use crate::store::StoreError;

pub use messages::MessageReplica;
pub use tasks::TaskReplica;
pub use users::UserReplica;

pub(crate) fn to_record<T: serde::Serialize>(input: &T) -> Result<Value, MutationError> {
    serde_json::to_value(input).map_err(|e| MutationError {
        cause: StoreError::permanent(format!("unserializable input: {e}")),
    })
}

pub(crate) fn missing_payload(kind: &'static str) -> MergeOutcome {
    MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
        kind,
        reason: "event carried no payload".into(),
    })
}

pub(crate) fn malformed(kind: &'static str, reason: &str) -> MergeOutcome {
    MergeOutcome::Dropped(MergeAnomaly::MalformedRow {
        kind,
        reason: reason.into(),
    })
}

/// Monotonic stamp bumped each time a snapshot replaces a collection.
/// Carried in logs so merge activity can be correlated with the snapshot
/// generation it applied to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotVersion(u64);

impl SnapshotVersion {
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub(crate) fn bump(self) -> Self {
        Self(self.0 + 1)
    }
}
