//! Single read/write surface offered to the UI layer.
//!
//! An explicitly constructed instance with a clear lifecycle — construct,
//! `start`, `pump` on each turn of the embedder's loop, `shutdown` — rather
//! than ambient shared state, so independent instances can be stood up per
//! scenario.

use std::sync::Arc;

use crate::config::Config;
use crate::error::MutationError;
use crate::feed::ChangeFeed;
use crate::join::JoinResolver;
use crate::model::{
    ChatChannel, Message, NewTask, Person, RecordId, Subtask, SubtaskPatch, Task, TaskPatch,
    UserId,
};
use crate::replica::{MessageReplica, TaskReplica, UserReplica};
use crate::store::RemoteStore;

pub struct DataFacade {
    tasks: TaskReplica,
    messages: MessageReplica,
    users: UserReplica,
    selected_task: Option<RecordId>,
    chat_channel: ChatChannel,
}

impl DataFacade {
    pub fn new(store: Arc<dyn RemoteStore>, feed: Arc<dyn ChangeFeed>, config: Config) -> Self {
        let resolver = Arc::new(JoinResolver::new());
        Self {
            tasks: TaskReplica::new(store.clone(), feed.clone(), &config),
            messages: MessageReplica::new(
                store.clone(),
                feed.clone(),
                resolver.clone(),
                &config,
            ),
            users: UserReplica::new(store, feed, resolver, &config),
            selected_task: None,
            chat_channel: ChatChannel::Team,
        }
    }

    /// Subscribe and snapshot every family. Families started before a
    /// failure keep their subscriptions and continue buffering; a retry via
    /// `start` or the per-family `refetch_*` picks them up.
    pub fn start(&mut self) -> crate::Result<()> {
        self.tasks.start()?;
        self.users.start()?;
        self.messages.start()?;
        Ok(())
    }

    /// Drain all pending change events into the replicas. Users go first so
    /// directory updates land in the join index before message inserts
    /// resolve against it.
    pub fn pump(&mut self) {
        self.users.pump();
        self.messages.pump();
        self.tasks.pump();
        if let Some(selected) = &self.selected_task {
            if !self.tasks.list().iter().any(|t| t.id == *selected) {
                self.selected_task = None;
            }
        }
    }

    // ----- tasks -----

    pub fn tasks(&self) -> &[Task] {
        self.tasks.list()
    }

    pub fn tasks_loading(&self) -> bool {
        self.tasks.loading()
    }

    pub fn task(&self, id: &RecordId) -> Option<&Task> {
        self.tasks.list().iter().find(|t| t.id == *id)
    }

    pub fn subtasks_of(&self, id: &RecordId) -> &[Subtask] {
        self.task(id).map(|t| t.subtasks.as_slice()).unwrap_or(&[])
    }

    pub fn add_task(&self, input: NewTask) -> Result<(), MutationError> {
        self.tasks.add_task(input)
    }

    pub fn update_task(&self, id: &RecordId, patch: &TaskPatch) -> Result<(), MutationError> {
        self.tasks.update_task(id, patch)
    }

    /// Delete remotely and, on success, drop the selection if it pointed at
    /// the doomed task. The visible row disappears only once the delete
    /// event round-trips.
    pub fn delete_task(&mut self, id: &RecordId) -> Result<(), MutationError> {
        self.tasks.delete_task(id)?;
        if self.selected_task.as_ref() == Some(id) {
            self.selected_task = None;
        }
        Ok(())
    }

    pub fn add_subtask(&self, task_id: &RecordId, title: &str) -> Result<(), MutationError> {
        self.tasks.add_subtask(task_id, title)
    }

    pub fn update_subtask(&self, id: &RecordId, patch: &SubtaskPatch) -> Result<(), MutationError> {
        self.tasks.update_subtask(id, patch)
    }

    pub fn toggle_subtask(&self, id: &RecordId, completed: bool) -> Result<(), MutationError> {
        self.tasks.toggle_subtask(id, completed)
    }

    pub fn remove_subtask(&self, id: &RecordId) -> Result<(), MutationError> {
        self.tasks.remove_subtask(id)
    }

    pub fn refetch_tasks(&mut self) -> crate::Result<()> {
        self.tasks.refetch()
    }

    // ----- messages -----

    pub fn messages(&self) -> &[Message] {
        self.messages.list()
    }

    pub fn messages_loading(&self) -> bool {
        self.messages.loading()
    }

    /// Messages in the currently selected chat channel.
    pub fn channel_messages(&self) -> Vec<&Message> {
        self.messages.in_channel(self.chat_channel).collect()
    }

    pub fn send_message(
        &self,
        content: &str,
        channel: ChatChannel,
        sender_id: &UserId,
    ) -> Result<(), MutationError> {
        self.messages.send_message(content, channel, sender_id)
    }

    pub fn delete_message(&self, id: &RecordId) -> Result<(), MutationError> {
        self.messages.delete_message(id)
    }

    pub fn refetch_messages(&mut self) -> crate::Result<()> {
        self.messages.refetch()
    }

    // ----- users -----

    pub fn users(&self) -> &[Person] {
        self.users.list()
    }

    pub fn users_loading(&self) -> bool {
        self.users.loading()
    }

    pub fn refetch_users(&mut self) -> crate::Result<()> {
        self.users.refetch()
    }

    // ----- UI selection state -----

    pub fn select_task(&mut self, id: Option<RecordId>) {
        self.selected_task = id;
    }

    pub fn selected_task(&self) -> Option<&RecordId> {
        self.selected_task.as_ref()
    }

    pub fn set_chat_channel(&mut self, channel: ChatChannel) {
        self.chat_channel = channel;
    }

    pub fn chat_channel(&self) -> ChatChannel {
        self.chat_channel
    }

    /// Release every subscription. Also runs on drop via the replicas.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
        self.messages.shutdown();
        self.users.shutdown();
    }
}
