//! Denormalized-join resolution.
//!
//! A secondary index over the user directory (id -> name, id -> role), seeded
//! at snapshot time and refreshed incrementally from directory and
//! role-assignment events. Lookups never leave the process: the per-insert
//! remote round trips of a naive design are replaced by point reads here.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{Role, UNKNOWN_SENDER, UserId};

#[derive(Default)]
struct DirectoryIndex {
    names: HashMap<UserId, String>,
    roles: HashMap<UserId, Role>,
}

/// Shared between the user replica (writer) and the message replica
/// (reader). Interior mutability keeps the read surface `&self`.
#[derive(Default)]
pub struct JoinResolver {
    index: Mutex<DirectoryIndex>,
}

impl JoinResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for a sender; `"Unknown"` when the directory has no
    /// entry (yet).
    pub fn resolve_sender_name(&self, id: &UserId) -> String {
        self.lock()
            .names
            .get(id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }

    /// Role for a user; missing assignments resolve to `client`.
    pub fn resolve_role(&self, id: &UserId) -> Role {
        self.lock().roles.get(id).copied().unwrap_or_default()
    }

    pub fn record_name(&self, id: UserId, name: String) {
        self.lock().names.insert(id, name);
    }

    pub fn record_role(&self, id: UserId, role: Role) {
        self.lock().roles.insert(id, role);
    }

    /// Drop a directory entry (person deleted). The role entry is keyed by
    /// the same user and goes with it.
    pub fn forget(&self, id: &UserId) {
        let mut index = self.lock();
        index.names.remove(id);
        index.roles.remove(id);
    }

    pub fn forget_role(&self, id: &UserId) {
        self.lock().roles.remove(id);
    }

    pub fn seed_names(&self, entries: impl IntoIterator<Item = (UserId, String)>) {
        self.lock().names.extend(entries);
    }

    pub fn seed_roles(&self, entries: impl IntoIterator<Item = (UserId, Role)>) {
        self.lock().roles.extend(entries);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryIndex> {
        self.index.lock().expect("directory index lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sender_falls_back() {
        let resolver = JoinResolver::new();
        assert_eq!(resolver.resolve_sender_name(&UserId::from("u1")), "Unknown");
    }

    #[test]
    fn missing_role_defaults_to_client() {
        let resolver = JoinResolver::new();
        assert_eq!(resolver.resolve_role(&UserId::from("u1")), Role::Client);
    }

    #[test]
    fn point_refresh_overrides_seed() {
        let resolver = JoinResolver::new();
        resolver.seed_names([(UserId::from("u1"), "Alex".to_string())]);
        resolver.record_name(UserId::from("u1"), "Alexandra".to_string());
        assert_eq!(
            resolver.resolve_sender_name(&UserId::from("u1")),
            "Alexandra"
        );
    }

    #[test]
    fn forget_clears_both_indexes() {
        let resolver = JoinResolver::new();
        resolver.record_name(UserId::from("u1"), "Alex".to_string());
        resolver.record_role(UserId::from("u1"), Role::Admin);
        resolver.forget(&UserId::from("u1"));
        assert_eq!(resolver.resolve_sender_name(&UserId::from("u1")), "Unknown");
        assert_eq!(resolver.resolve_role(&UserId::from("u1")), Role::Client);
    }
}
