#![forbid(unsafe_code)]
//! Replica-synchronization core for a realtime project dashboard.
//!
//! Data lives in a remote authoritative store and is mirrored into local,
//! UI-consumable collections: one full snapshot read per collection, then a
//! push subscription whose change events are merged in under idempotent,
//! at-least-once-safe rules. Cross-collection joins (message sender names,
//! user roles, task sub-items) are resolved against an incrementally
//! maintained index rather than per-event remote lookups.

pub mod config;
pub mod error;
pub mod facade;
pub mod feed;
pub mod join;
pub mod merge;
pub mod model;
pub mod replica;
pub mod store;
pub mod telemetry;

pub use error::{Effect, Error, LoadError, MutationError, SubscriptionError, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the main surface at the crate root for convenience.
pub use crate::config::Config;
pub use crate::facade::DataFacade;
pub use crate::feed::{ChangeEvent, ChangeFeed, EventKind, EventMask, FeedSubscription};
pub use crate::join::JoinResolver;
pub use crate::model::{
    ChatChannel, Message, NewMessage, NewTask, Person, Priority, RecordId, Role, Subtask,
    SubtaskPatch, Task, TaskPatch, UserId,
};
pub use crate::replica::{MessageReplica, SnapshotVersion, TaskReplica, UserReplica};
pub use crate::store::{Filter, RemoteStore, StoreError};
