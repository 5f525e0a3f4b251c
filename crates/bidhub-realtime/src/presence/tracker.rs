//! Presence tracker: publishes join/leave records and owns presence timing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use bidhub_core::config::RealtimeConfig;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::presence::{Participant, PresenceStatus, UserPresence};

use crate::channel::registry::ChannelRegistry;
use crate::channel::types::ChannelType;

use super::session::PresenceSession;

/// Publishes presence for rooms and the global feed.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    registry: Arc<ChannelRegistry>,
    heartbeat: Duration,
    timeout: Duration,
}

impl PresenceTracker {
    /// Create a tracker with timing from `config`.
    pub fn new(registry: Arc<ChannelRegistry>, config: &RealtimeConfig) -> Self {
        Self {
            registry,
            heartbeat: config.presence_heartbeat(),
            timeout: config.presence_timeout(),
        }
    }

    /// Track a participant in an auction room.
    pub async fn join(
        &self,
        room_id: AuctionId,
        participant: &Participant,
        status: PresenceStatus,
    ) -> AppResult<UserPresence> {
        let presence = UserPresence::joining(participant, status, Some(room_id));
        self.registry
            .track(&ChannelType::Auction(room_id).to_topic(), presence.clone())
            .await?;
        info!(room_id = %room_id, user_id = %participant.user_id, "Participant joined room");
        Ok(presence)
    }

    /// Stop tracking a participant in an auction room.
    pub async fn leave(&self, room_id: AuctionId, user_id: UserId) -> AppResult<()> {
        self.registry
            .untrack(&ChannelType::Auction(room_id).to_topic(), user_id)
            .await?;
        info!(room_id = %room_id, user_id = %user_id, "Participant left room");
        Ok(())
    }

    /// Re-track an existing record on a topic with a new status.
    pub async fn update_status(
        &self,
        topic: &str,
        presence: &UserPresence,
        status: PresenceStatus,
    ) -> AppResult<UserPresence> {
        let mut updated = presence.clone().touched(Utc::now());
        updated.status = status;
        self.registry.track(topic, updated.clone()).await?;
        debug!(topic = %topic, user_id = %presence.user_id, status = %status, "Presence status changed");
        Ok(updated)
    }

    /// Open a global presence session for a participant.
    pub async fn start_session(&self, participant: Participant) -> AppResult<PresenceSession> {
        PresenceSession::start(self.clone(), participant).await
    }

    /// Records last seen before this instant are stale.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Interval between re-tracks.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
    }

    pub(crate) fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }
}
