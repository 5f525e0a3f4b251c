//! Consumer-facing lifecycle wrapper.

use std::sync::Arc;

use tracing::debug;

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, NotificationId, UserId};
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::{ChatMessage, ChatMessageKind};
use bidhub_entity::notification::LiveNotification;
use bidhub_entity::presence::{Participant, PresenceStatus, UserPresence};

use crate::notification::router::NotificationSubscription;
use crate::notification::sink::NotificationSink;
use crate::room::{AuctionRoom, RoomEventSink};
use crate::server::{BidOutcome, LiveAuctionService};

/// Tracks which auction and which notification feed a consumer is
/// interested in, and keeps exactly one subscription open for each.
///
/// Changing the watched id tears the previous subscription down, waiting
/// for its channel release, before the new one is attached.
pub struct ClientAdapter {
    service: LiveAuctionService,
    room_sink: Arc<dyn RoomEventSink>,
    notification_sink: Arc<dyn NotificationSink>,
    room: Option<AuctionRoom>,
    notifications: Option<NotificationSubscription>,
}

impl std::fmt::Debug for ClientAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAdapter")
            .field("auction", &self.watched_auction())
            .field("user", &self.watched_user())
            .finish()
    }
}

impl ClientAdapter {
    /// Create an adapter delivering room and notification events to the
    /// given sinks.
    pub fn new(
        service: LiveAuctionService,
        room_sink: Arc<dyn RoomEventSink>,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            service,
            room_sink,
            notification_sink,
            room: None,
            notifications: None,
        }
    }

    /// Watch an auction. A no-op if it is already watched.
    pub async fn watch_auction(&mut self, auction_id: AuctionId) -> AppResult<()> {
        if self.watched_auction() == Some(auction_id) {
            return Ok(());
        }
        self.unwatch_auction().await;

        let room = self
            .service
            .subscribe_to_auction(auction_id, self.room_sink.clone())
            .await?;
        self.room = Some(room);
        debug!(auction_id = %auction_id, "Watching auction");
        Ok(())
    }

    /// Stop watching the current auction.
    pub async fn unwatch_auction(&mut self) {
        if let Some(room) = self.room.take() {
            room.close().await;
        }
    }

    /// Watch a user's notifications. A no-op if already watched.
    pub async fn watch_notifications(&mut self, user_id: UserId) -> AppResult<()> {
        if self.watched_user() == Some(user_id) {
            return Ok(());
        }
        self.unwatch_notifications().await;

        let feed = self
            .service
            .subscribe_to_notifications(user_id, self.notification_sink.clone())
            .await?;
        self.notifications = Some(feed);
        debug!(user_id = %user_id, "Watching notifications");
        Ok(())
    }

    /// Stop watching notifications.
    pub async fn unwatch_notifications(&mut self) {
        if let Some(feed) = self.notifications.take() {
            feed.close().await;
        }
    }

    /// Tear down every subscription.
    pub async fn close(&mut self) {
        self.unwatch_auction().await;
        self.unwatch_notifications().await;
    }

    /// The watched auction id.
    pub fn watched_auction(&self) -> Option<AuctionId> {
        self.room.as_ref().map(|r| r.auction_id())
    }

    /// The watched user id.
    pub fn watched_user(&self) -> Option<UserId> {
        self.notifications.as_ref().map(|n| n.user_id())
    }

    /// The open room, if any.
    pub fn room(&self) -> Option<&AuctionRoom> {
        self.room.as_ref()
    }

    /// The cached auction row.
    pub fn auction(&self) -> Option<LiveAuction> {
        self.room.as_ref().map(|r| r.auction())
    }

    /// Confirmed bids, oldest first.
    pub fn bids(&self) -> Vec<Bid> {
        self.room.as_ref().map(|r| r.bids()).unwrap_or_default()
    }

    /// Highest confirmed bid, falling back to the starting bid.
    pub fn current_highest_bid(&self) -> Option<i64> {
        self.room.as_ref().map(|r| r.current_highest_bid())
    }

    /// Current participants of the watched room.
    pub fn participants(&self) -> Vec<UserPresence> {
        self.room
            .as_ref()
            .map(|r| r.participants())
            .unwrap_or_default()
    }

    /// Chat transcript of the watched room.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.room
            .as_ref()
            .map(|r| r.transcript())
            .unwrap_or_default()
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> Vec<LiveNotification> {
        self.notifications
            .as_ref()
            .map(|n| n.notifications())
            .unwrap_or_default()
    }

    /// Unread notification count.
    pub fn unread_count(&self) -> usize {
        self.notifications
            .as_ref()
            .map(|n| n.unread_count())
            .unwrap_or(0)
    }

    /// Join the watched room.
    pub async fn join(&self, participant: &Participant, status: PresenceStatus) -> AppResult<()> {
        self.require_room()?.join(participant, status).await
    }

    /// Bid in the watched room.
    pub async fn place_bid(&self, bidder: &Participant, amount: i64) -> BidOutcome {
        match self.require_room() {
            Ok(room) => room.place_bid(bidder, amount).await,
            Err(e) => BidOutcome::rejected(&e),
        }
    }

    /// Chat in the watched room.
    pub async fn send_chat_message(
        &self,
        author: &Participant,
        message: &str,
        kind: Option<ChatMessageKind>,
    ) -> AppResult<ChatMessage> {
        self.require_room()?
            .send_chat_message(author, message, kind)
            .await
    }

    /// Mark one notification read.
    pub fn mark_as_read(&self, id: NotificationId) -> bool {
        self.notifications
            .as_ref()
            .is_some_and(|n| n.mark_as_read(id))
    }

    /// Mark every notification read.
    pub fn mark_all_as_read(&self) -> usize {
        self.notifications
            .as_ref()
            .map(|n| n.mark_all_as_read())
            .unwrap_or(0)
    }

    fn require_room(&self) -> AppResult<&AuctionRoom> {
        self.room
            .as_ref()
            .ok_or_else(|| AppError::validation("No auction is being watched"))
    }
}
