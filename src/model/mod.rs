//! Replicated entity model: tasks with sub-items, chat messages, and the
//! user directory, shaped the way the remote store delivers them.

mod domain;
mod message;
mod person;
mod task;

pub(crate) use message::UNKNOWN_SENDER;

pub use domain::{ChatChannel, Priority, RecordId, Role, UserId};
pub use message::{Message, NewMessage};
pub use person::{Person, RoleAssignment};
pub use task::{NewTask, Subtask, SubtaskPatch, Task, TaskPatch};
