//! Local presence set of one topic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use bidhub_core::types::id::UserId;
use bidhub_entity::presence::UserPresence;

/// Who is present on a topic, keyed by user id.
///
/// Pure state: every transform is synchronous and performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    entries: HashMap<UserId, UserPresence>,
}

impl PresenceRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with a snapshot, dropping records not
    /// refreshed since `cutoff`.
    pub fn apply_sync(&mut self, snapshot: Vec<UserPresence>, cutoff: DateTime<Utc>) {
        self.entries = snapshot
            .into_iter()
            .filter(|p| !p.is_stale(cutoff))
            .map(|p| (p.user_id, p))
            .collect();
    }

    /// Add or replace one entry. Returns `true` if the user was not present.
    pub fn apply_join(&mut self, presence: UserPresence) -> bool {
        self.entries.insert(presence.user_id, presence).is_none()
    }

    /// Remove one entry. Returns `true` if the user was present.
    pub fn apply_leave(&mut self, user_id: UserId) -> bool {
        self.entries.remove(&user_id).is_some()
    }

    /// Drop entries not refreshed since `cutoff`, returning who was removed.
    pub fn prune_stale(&mut self, cutoff: DateTime<Utc>) -> Vec<UserId> {
        let stale: Vec<UserId> = self
            .entries
            .values()
            .filter(|p| p.is_stale(cutoff))
            .map(|p| p.user_id)
            .collect();
        for user_id in &stale {
            self.entries.remove(user_id);
        }
        stale
    }

    /// Current participants, earliest joiner first.
    pub fn participants(&self) -> Vec<UserPresence> {
        let mut list: Vec<UserPresence> = self.entries.values().cloned().collect();
        list.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        list
    }

    /// Look up one user.
    pub fn get(&self, user_id: UserId) -> Option<&UserPresence> {
        self.entries.get(&user_id)
    }

    /// Whether a user is present.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.contains_key(&user_id)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
