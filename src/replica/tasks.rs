//! Task family replica: tasks plus their physically independent subtask
//! collection, projected as one nested structure.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{CollectionNames, Config, Limits};
use crate::error::{LoadError, MutationError};
use crate::feed::{ChangeEvent, ChangeFeed, EventKind, EventMask, FeedSubscription};
use crate::merge::{
    MergeAnomaly, MergeOutcome, Replicated, find_mut, materialize, patch_row, remove_row, row_id,
    upsert_row,
};
use crate::model::{NewTask, RecordId, Subtask, SubtaskPatch, Task, TaskPatch};
use crate::replica::{SnapshotVersion, malformed, missing_payload, to_record};
use crate::store::RemoteStore;

/// Sub-items whose parent has not arrived, keyed by the missing parent id in
/// first-seen order. Never visible; adopted wholesale when the parent shows
/// up, evicted oldest-parent-first past the configured cap.
#[derive(Default)]
struct OrphanBucket {
    pending: VecDeque<(RecordId, Vec<Subtask>)>,
}

impl OrphanBucket {
    fn count(&self) -> usize {
        self.pending.iter().map(|(_, subs)| subs.len()).sum()
    }

    fn push(&mut self, sub: Subtask, cap: usize) {
        let parent = sub.task_id.clone();
        match self.pending.iter_mut().find(|(id, _)| *id == parent) {
            Some((_, subs)) => subs.push(sub),
            None => self.pending.push_back((parent, vec![sub])),
        }
        while self.count() > cap {
            if let Some((evicted, subs)) = self.pending.pop_front() {
                warn!(parent = %evicted, dropped = subs.len(), "orphan bucket full, evicting");
            } else {
                break;
            }
        }
    }

    fn take(&mut self, parent: &RecordId) -> Option<Vec<Subtask>> {
        let at = self.pending.iter().position(|(id, _)| id == parent)?;
        self.pending.remove(at).map(|(_, subs)| subs)
    }

    fn drop_parent(&mut self, parent: &RecordId) {
        self.pending.retain(|(id, _)| id != parent);
    }

    fn remove_subtask(&mut self, id: &RecordId) -> Option<Subtask> {
        let mut found = None;
        for (slot, (_, subs)) in self.pending.iter().enumerate() {
            if let Some(at) = subs.iter().position(|s| s.id == *id) {
                found = Some((slot, at));
                break;
            }
        }
        let (slot, at) = found?;
        let sub = self.pending[slot].1.remove(at);
        if self.pending[slot].1.is_empty() {
            self.pending.remove(slot);
        }
        Some(sub)
    }

    fn find_mut(&mut self, id: &RecordId) -> Option<&mut Subtask> {
        self.pending
            .iter_mut()
            .flat_map(|(_, subs)| subs.iter_mut())
            .find(|s| s.id == *id)
    }
}

pub struct TaskReplica {
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
    collections: CollectionNames,
    limits: Limits,
    tasks: Vec<Task>,
    orphans: OrphanBucket,
    loading: bool,
    version: SnapshotVersion,
    task_sub: Option<FeedSubscription>,
    subtask_sub: Option<FeedSubscription>,
}

impl TaskReplica {
    pub fn new(store: Arc<dyn RemoteStore>, feed: Arc<dyn ChangeFeed>, config: &Config) -> Self {
        Self {
            store,
            feed,
            collections: config.collections.clone(),
            limits: config.limits.clone(),
            tasks: Vec::new(),
            orphans: OrphanBucket::default(),
            loading: true,
            version: SnapshotVersion::default(),
            task_sub: None,
            subtask_sub: None,
        }
    }

    /// Subscribe to both collections, then take the initial snapshot.
    /// Subscribing first means events pushed during the bulk read wait in the
    /// channel instead of being lost. On load failure the subscriptions stay
    /// open (still buffering) and `loading` stays set; `refetch` retries.
    pub fn start(&mut self) -> crate::Result<()> {
        if self.task_sub.is_none() {
            self.task_sub = Some(self.feed.subscribe(&self.collections.tasks, EventMask::ALL)?);
        }
        if self.subtask_sub.is_none() {
            self.subtask_sub = Some(
                self.feed
                    .subscribe(&self.collections.subtasks, EventMask::ALL)?,
            );
        }
        self.refetch()
    }

    /// Re-run the snapshot load and replace the collection wholesale.
    pub fn refetch(&mut self) -> crate::Result<()> {
        let (tasks, orphans) = self.load_snapshot()?;
        self.tasks = tasks;
        self.orphans = orphans;
        self.loading = false;
        self.version = self.version.bump();
        debug!(
            collection = %self.collections.tasks,
            version = self.version.get(),
            rows = self.tasks.len(),
            "snapshot installed"
        );
        Ok(())
    }

    fn load_snapshot(&self) -> Result<(Vec<Task>, OrphanBucket), LoadError> {
        let task_rows = self
            .store
            .read(&self.collections.tasks, None)
            .map_err(|cause| LoadError {
                collection: self.collections.tasks.clone(),
                cause,
            })?;
        let subtask_rows = self
            .store
            .read(&self.collections.subtasks, None)
            .map_err(|cause| LoadError {
                collection: self.collections.subtasks.clone(),
                cause,
            })?;

        let mut tasks: Vec<Task> = Vec::new();
        for row in &task_rows {
            match materialize::<Task>(row) {
                Ok(task) => tasks.push(task),
                Err(anomaly) => MergeOutcome::Dropped(anomaly).absorb(&self.collections.tasks),
            }
        }
        let mut orphans = OrphanBucket::default();
        for row in &subtask_rows {
            match materialize::<Subtask>(row) {
                Ok(sub) => match find_mut(&mut tasks, &sub.task_id) {
                    Some(parent) => parent.subtasks.push(sub),
                    None => {
                        MergeOutcome::Dropped(MergeAnomaly::OrphanSubtask {
                            id: sub.id.clone(),
                            task_id: sub.task_id.clone(),
                        })
                        .absorb(&self.collections.subtasks);
                        orphans.push(sub, self.limits.max_orphan_subtasks);
                    }
                },
                Err(anomaly) => MergeOutcome::Dropped(anomaly).absorb(&self.collections.subtasks),
            }
        }
        Ok((tasks, orphans))
    }

    /// Apply everything queued on both subscriptions. No-op until the first
    /// snapshot has installed: pre-snapshot events stay buffered.
    pub fn pump(&mut self) {
        if self.loading {
            return;
        }
        let events: Vec<ChangeEvent> = self
            .task_sub
            .as_ref()
            .map(FeedSubscription::drain)
            .unwrap_or_default();
        for event in events {
            let outcome = self.apply_task_event(event);
            outcome.absorb(&self.collections.tasks);
        }
        let events: Vec<ChangeEvent> = self
            .subtask_sub
            .as_ref()
            .map(FeedSubscription::drain)
            .unwrap_or_default();
        for event in events {
            let outcome = self.apply_subtask_event(event);
            outcome.absorb(&self.collections.subtasks);
        }
    }

    fn apply_task_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        match event.kind {
            EventKind::Insert => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Task::KIND);
                };
                let outcome = upsert_row(&mut self.tasks, row);
                if outcome == MergeOutcome::Applied {
                    // Newly visible parent adopts any sub-items that arrived
                    // ahead of it.
                    if let Some(id) = row.as_object().and_then(row_id) {
                        if let Some(pending) = self.orphans.take(&id) {
                            debug!(task = %id, adopted = pending.len(), "adopting orphaned subtasks");
                            if let Some(task) = find_mut(&mut self.tasks, &id) {
                                task.subtasks.extend(pending);
                            }
                        }
                    }
                }
                outcome
            }
            EventKind::Update => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Task::KIND);
                };
                patch_row(&mut self.tasks, row)
            }
            EventKind::Delete => {
                let Some(id) = event.old_id else {
                    return missing_payload(Task::KIND);
                };
                // Cascade inside one merge step: the nested subtasks go with
                // the task, and pending orphans for the id are dropped so a
                // redelivered insert cannot resurrect them.
                self.orphans.drop_parent(&id);
                remove_row(&mut self.tasks, &id)
            }
        }
    }

    fn apply_subtask_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        match event.kind {
            EventKind::Insert => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Subtask::KIND);
                };
                let Some(object) = row.as_object() else {
                    return malformed(Subtask::KIND, "payload is not an object");
                };
                let Some(id) = row_id(object) else {
                    return malformed(Subtask::KIND, "payload has no id");
                };
                if let Some(existing) = self.find_subtask_mut(&id) {
                    existing.apply_patch(object);
                    self.rehome_if_moved(&id);
                    return MergeOutcome::AppliedWith(MergeAnomaly::DuplicateInsert {
                        kind: Subtask::KIND,
                        id,
                    });
                }
                match materialize::<Subtask>(row) {
                    Ok(sub) => self.attach_subtask(sub),
                    Err(anomaly) => MergeOutcome::Dropped(anomaly),
                }
            }
            EventKind::Update => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Subtask::KIND);
                };
                let Some(object) = row.as_object() else {
                    return malformed(Subtask::KIND, "payload is not an object");
                };
                let Some(id) = row_id(object) else {
                    return malformed(Subtask::KIND, "payload has no id");
                };
                match self.find_subtask_mut(&id) {
                    Some(existing) => {
                        existing.apply_patch(object);
                        self.rehome_if_moved(&id);
                        MergeOutcome::Applied
                    }
                    None => MergeOutcome::Dropped(MergeAnomaly::UnknownUpdate {
                        kind: Subtask::KIND,
                        id,
                    }),
                }
            }
            EventKind::Delete => {
                let Some(id) = event.old_id else {
                    return missing_payload(Subtask::KIND);
                };
                if self.detach_subtask(&id).is_some() {
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::Dropped(MergeAnomaly::UnknownDelete {
                        kind: Subtask::KIND,
                        id,
                    })
                }
            }
        }
    }

    fn attach_subtask(&mut self, sub: Subtask) -> MergeOutcome {
        match find_mut(&mut self.tasks, &sub.task_id) {
            Some(parent) => {
                parent.subtasks.push(sub);
                MergeOutcome::Applied
            }
            None => {
                let anomaly = MergeAnomaly::OrphanSubtask {
                    id: sub.id.clone(),
                    task_id: sub.task_id.clone(),
                };
                self.orphans.push(sub, self.limits.max_orphan_subtasks);
                MergeOutcome::AppliedWith(anomaly)
            }
        }
    }

    fn find_subtask_mut(&mut self, id: &RecordId) -> Option<&mut Subtask> {
        let visible = self
            .tasks
            .iter()
            .any(|t| t.subtasks.iter().any(|s| s.id == *id));
        if visible {
            return self
                .tasks
                .iter_mut()
                .flat_map(|t| t.subtasks.iter_mut())
                .find(|s| s.id == *id);
        }
        self.orphans.find_mut(id)
    }

    /// If a patch changed a subtask's `task_id`, move it out of its current
    /// container and re-attach (to the new parent or the orphan bucket).
    fn rehome_if_moved(&mut self, id: &RecordId) {
        let mut current: Option<(RecordId, RecordId)> = None;
        for task in &self.tasks {
            if let Some(sub) = task.subtasks.iter().find(|s| s.id == *id) {
                current = Some((task.id.clone(), sub.task_id.clone()));
                break;
            }
        }
        if current.is_none() {
            for (key, subs) in &self.orphans.pending {
                if let Some(sub) = subs.iter().find(|s| s.id == *id) {
                    current = Some((key.clone(), sub.task_id.clone()));
                    break;
                }
            }
        }
        let Some((container, declared)) = current else {
            return;
        };
        if container == declared {
            return;
        }
        if let Some(sub) = self.detach_subtask(id) {
            self.attach_subtask(sub).absorb(&self.collections.subtasks);
        }
    }

    fn detach_subtask(&mut self, id: &RecordId) -> Option<Subtask> {
        for task in &mut self.tasks {
            if let Some(at) = task.subtasks.iter().position(|s| s.id == *id) {
                return Some(task.subtasks.remove(at));
            }
        }
        self.orphans.remove_subtask(id)
    }

    /// Ordered view of the merged collection. Never fails; reflects the last
    /// successfully merged state.
    pub fn list(&self) -> &[Task] {
        &self.tasks
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn add_task(&self, input: NewTask) -> Result<(), MutationError> {
        let record = to_record(&input)?;
        self.store
            .insert(&self.collections.tasks, record)
            .map_err(MutationError::from)
    }

    pub fn update_task(&self, id: &RecordId, patch: &TaskPatch) -> Result<(), MutationError> {
        let patch = to_record(patch)?;
        self.store
            .update_patch(&self.collections.tasks, id, patch)
            .map_err(MutationError::from)
    }

    pub fn delete_task(&self, id: &RecordId) -> Result<(), MutationError> {
        self.store
            .delete(&self.collections.tasks, id)
            .map_err(MutationError::from)
    }

    pub fn add_subtask(&self, task_id: &RecordId, title: &str) -> Result<(), MutationError> {
        let record = serde_json::json!({
            "task_id": task_id,
            "title": title,
            "priority": crate::model::Priority::default(),
        });
        self.store
            .insert(&self.collections.subtasks, record)
            .map_err(MutationError::from)
    }

    pub fn update_subtask(
        &self,
        id: &RecordId,
        patch: &SubtaskPatch,
    ) -> Result<(), MutationError> {
        let patch = to_record(patch)?;
        self.store
            .update_patch(&self.collections.subtasks, id, patch)
            .map_err(MutationError::from)
    }

    pub fn toggle_subtask(&self, id: &RecordId, completed: bool) -> Result<(), MutationError> {
        self.update_subtask(
            id,
            &SubtaskPatch {
                completed: Some(!completed),
                ..SubtaskPatch::default()
            },
        )
    }

    pub fn remove_subtask(&self, id: &RecordId) -> Result<(), MutationError> {
        self.store
            .delete(&self.collections.subtasks, id)
            .map_err(MutationError::from)
    }

    /// Release both feed channels. Also runs on drop, so a replica cannot
    /// leak subscriptions on any exit path.
    pub fn shutdown(&mut self) {
        if let Some(sub) = self.task_sub.take() {
            self.feed.unsubscribe(sub.handle);
        }
        if let Some(sub) = self.subtask_sub.take() {
            self.feed.unsubscribe(sub.handle);
        }
    }
}

impl Drop for TaskReplica {
    fn drop(&mut self) {
        self.shutdown();
    }
}

