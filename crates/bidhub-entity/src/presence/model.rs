//! Presence value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bidhub_core::types::id::{AuctionId, UserId};

use super::PresenceStatus;

/// Identity of a user taking part in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// User ID.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

impl Participant {
    /// Create a participant.
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// A presence record as tracked on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    /// User ID.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Current status.
    pub status: PresenceStatus,
    /// The room the user is in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_room: Option<AuctionId>,
    /// When the user first joined the channel.
    pub joined_at: DateTime<Utc>,
    /// Last heartbeat or status change.
    pub last_seen: DateTime<Utc>,
}

impl UserPresence {
    /// Create a fresh record for a participant joining now.
    pub fn joining(
        participant: &Participant,
        status: PresenceStatus,
        current_room: Option<AuctionId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: participant.user_id,
            username: participant.username.clone(),
            status,
            current_room,
            joined_at: now,
            last_seen: now,
        }
    }

    /// Refresh `last_seen`, keeping the original join time.
    pub fn touched(mut self, now: DateTime<Utc>) -> Self {
        self.last_seen = now;
        self
    }

    /// Whether this record has not been refreshed since `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen < cutoff
    }
}
