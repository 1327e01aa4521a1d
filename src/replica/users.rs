//! User directory replica.
//!
//! Two subscriptions feed one visible collection: directory rows carry the
//! person, role-assignment rows carry the denormalized `role`. Every
//! directory and role event also refreshes the shared join index, which is
//! what lets the message replica resolve sender names without a network
//! round trip per insert.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{CollectionNames, Config};
use crate::error::LoadError;
use crate::feed::{ChangeEvent, ChangeFeed, EventKind, EventMask, FeedSubscription};
use crate::join::JoinResolver;
use crate::merge::{
    MergeAnomaly, MergeOutcome, Replicated, materialize, patch_row, remove_row, row_id, upsert_row,
};
use crate::model::{Person, RecordId, Role, RoleAssignment, UserId};
use crate::replica::{SnapshotVersion, malformed, missing_payload};
use crate::store::{Filter, RemoteStore};

const ROLE_KIND: &str = "role_assignment";

pub struct UserReplica {
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
    resolver: Arc<JoinResolver>,
    collections: CollectionNames,
    users: Vec<Person>,
    /// Role-assignment row id -> subject, so a role DELETE (which carries
    /// only the old row id) can be mapped back to the person it affects.
    role_rows: HashMap<RecordId, UserId>,
    loading: bool,
    version: SnapshotVersion,
    user_sub: Option<FeedSubscription>,
    role_sub: Option<FeedSubscription>,
}

impl UserReplica {
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
            users: Vec::new(),
            role_rows: HashMap::new(),
            loading: true,
            version: SnapshotVersion::default(),
            user_sub: None,
            role_sub: None,
        }
    }

    pub fn start(&mut self) -> crate::Result<()> {
        if self.user_sub.is_none() {
            self.user_sub = Some(self.feed.subscribe(&self.collections.users, EventMask::ALL)?);
        }
        if self.role_sub.is_none() {
            self.role_sub = Some(
                self.feed
                    .subscribe(&self.collections.user_roles, EventMask::ALL)?,
            );
        }
        self.refetch()
    }

    pub fn refetch(&mut self) -> crate::Result<()> {
        let (users, role_rows) = self.load_snapshot()?;
        self.users = users;
        self.role_rows = role_rows;
        self.loading = false;
        self.version = self.version.bump();
        debug!(
            collection = %self.collections.users,
            version = self.version.get(),
            rows = self.users.len(),
            "snapshot installed"
        );
        Ok(())
    }

    fn load_snapshot(&self) -> Result<(Vec<Person>, HashMap<RecordId, UserId>), LoadError> {
        let rows = self
            .store
            .read(&self.collections.users, None)
            .map_err(|cause| LoadError {
                collection: self.collections.users.clone(),
                cause,
            })?;

        let mut users: Vec<Person> = Vec::new();
        for row in &rows {
            match materialize::<Person>(row) {
                Ok(person) => users.push(person),
                Err(anomaly) => MergeOutcome::Dropped(anomaly).absorb(&self.collections.users),
            }
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        // One-time role lookup restricted to the users present. A failure
        // degrades every role to the `client` default instead of failing the
        // snapshot.
        let mut role_rows = HashMap::new();
        if !users.is_empty() {
            let filter = Filter::field_in(
                "user_id",
                users.iter().map(|u| u.user_id.as_str().to_string()).collect(),
            );
            match self.store.read(&self.collections.user_roles, Some(&filter)) {
                Ok(assignment_rows) => {
                    for row in &assignment_rows {
                        match serde_json::from_value::<RoleAssignment>(row.clone()) {
                            Ok(assignment) => {
                                if let Some(id) = assignment.id.clone() {
                                    role_rows.insert(id, assignment.user_id.clone());
                                }
                                self.resolver
                                    .record_role(assignment.user_id, assignment.role);
                            }
                            Err(err) => {
                                malformed(ROLE_KIND, &err.to_string())
                                    .absorb(&self.collections.user_roles);
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "role lookup failed, roles default to client");
                }
            }
        }

        for person in &mut users {
            person.role = self.resolver.resolve_role(&person.user_id);
            self.resolver
                .record_name(person.user_id.clone(), person.name.clone());
        }
        Ok((users, role_rows))
    }

    pub fn pump(&mut self) {
        if self.loading {
            return;
        }
        let events: Vec<ChangeEvent> = self
            .user_sub
            .as_ref()
            .map(FeedSubscription::drain)
            .unwrap_or_default();
        for event in events {
            let outcome = self.apply_user_event(event);
            outcome.absorb(&self.collections.users);
        }
        let events: Vec<ChangeEvent> = self
            .role_sub
            .as_ref()
            .map(FeedSubscription::drain)
            .unwrap_or_default();
        for event in events {
            let outcome = self.apply_role_event(event);
            outcome.absorb(&self.collections.user_roles);
        }
    }

    fn apply_user_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        match event.kind {
            EventKind::Insert | EventKind::Update => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(Person::KIND);
                };
                let outcome = match event.kind {
                    EventKind::Insert => upsert_row(&mut self.users, row),
                    _ => patch_row(&mut self.users, row),
                };
                if outcome.applied() {
                    if let Some(id) = row.as_object().and_then(row_id) {
                        if let Some(person) = self.users.iter_mut().find(|p| p.id == id) {
                            person.role = self.resolver.resolve_role(&person.user_id);
                            self.resolver
                                .record_name(person.user_id.clone(), person.name.clone());
                        }
                    }
                }
                outcome
            }
            EventKind::Delete => {
                let Some(id) = event.old_id else {
                    return missing_payload(Person::KIND);
                };
                if let Some(person) = self.users.iter().find(|p| p.id == id) {
                    self.resolver.forget(&person.user_id);
                }
                remove_row(&mut self.users, &id)
            }
        }
    }

    fn apply_role_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        match event.kind {
            EventKind::Insert | EventKind::Update => {
                let Some(row) = event.new.as_ref() else {
                    return missing_payload(ROLE_KIND);
                };
                let assignment: RoleAssignment = match serde_json::from_value(row.clone()) {
                    Ok(parsed) => parsed,
                    Err(err) => return malformed(ROLE_KIND, &err.to_string()),
                };
                if let Some(id) = assignment.id.clone() {
                    self.role_rows.insert(id, assignment.user_id.clone());
                }
                self.resolver
                    .record_role(assignment.user_id.clone(), assignment.role);
                self.apply_role_to_person(&assignment.user_id, assignment.role);
                MergeOutcome::Applied
            }
            EventKind::Delete => {
                let Some(id) = event.old_id else {
                    return missing_payload(ROLE_KIND);
                };
                match self.role_rows.remove(&id) {
                    Some(user_id) => {
                        self.resolver.forget_role(&user_id);
                        self.apply_role_to_person(&user_id, Role::default());
                        MergeOutcome::Applied
                    }
                    None => MergeOutcome::Dropped(MergeAnomaly::UnknownDelete {
                        kind: ROLE_KIND,
                        id,
                    }),
                }
            }
        }
    }

    fn apply_role_to_person(&mut self, user_id: &UserId, role: Role) {
        for person in &mut self.users {
            if person.user_id == *user_id {
                person.role = role;
            }
        }
    }

    /// Ordered view of the merged directory.
    pub fn list(&self) -> &[Person] {
        &self.users
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn shutdown(&mut self) {
        if let Some(sub) = self.user_sub.take() {
            self.feed.unsubscribe(sub.handle);
        }
        if let Some(sub) = self.role_sub.take() {
            self.feed.unsubscribe(sub.handle);
        }
    }
}

impl Drop for UserReplica {
    fn drop(&mut self) {
        self.shutdown();
    }
}
