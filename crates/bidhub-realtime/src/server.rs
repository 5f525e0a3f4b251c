//! Top-level live auction service that ties together all subsystems.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bidhub_core::config::RealtimeConfig;
use bidhub_core::error::{AppError, ErrorKind};
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::{ChatMessage, ChatMessageKind};
use bidhub_entity::presence::{Participant, PresenceStatus};

use crate::channel::registry::ChannelRegistry;
use crate::channel::subscription::Disposer;
use crate::channel::types::ChannelType;
use crate::ledger::bid_ledger::BidLedger;
use crate::message::types::ChannelEvent;
use crate::message::validator::validate_chat_message;
use crate::metrics::RealtimeMetrics;
use crate::notification::router::{NotificationRouter, NotificationSubscription};
use crate::notification::sink::NotificationSink;
use crate::presence::heartbeat::spawn_heartbeat;
use crate::presence::session::PresenceSession;
use crate::presence::tracker::PresenceTracker;
use crate::room::{AuctionRoom, RoomEventSink, RoomSubscription};
use crate::traits::store::AuctionStore;
use crate::traits::transport::RealtimeTransport;

/// Result of a bid attempt, rendered inline by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOutcome {
    /// Whether the store accepted the bid.
    pub success: bool,
    /// Human-readable reason when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// The persisted bid when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Bid>,
}

impl BidOutcome {
    /// An accepted bid.
    pub fn accepted(bid: Bid) -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            bid: Some(bid),
        }
    }

    /// A rejected bid.
    pub fn rejected(error: &AppError) -> Self {
        Self {
            success: false,
            error: Some(error.message.clone()),
            kind: Some(error.kind),
            bid: None,
        }
    }
}

/// Heartbeat keeping a [`LiveAuctionService::join_auction`] participant
/// tracked.
struct RoomJoin {
    disposer: Disposer,
    beat: JoinHandle<()>,
}

impl RoomJoin {
    async fn stop(self) {
        self.disposer.dispose();
        if let Err(e) = self.beat.await {
            warn!(error = %e, "Room heartbeat task failed");
        }
    }
}

type RoomJoins = Arc<Mutex<HashMap<(AuctionId, UserId), RoomJoin>>>;

/// Client-side live auction engine.
///
/// One instance per connected client. Cloning is cheap and every clone
/// shares the same channel registry.
#[derive(Clone)]
pub struct LiveAuctionService {
    /// Channel registry.
    pub registry: Arc<ChannelRegistry>,
    /// Authoritative store.
    pub store: Arc<dyn AuctionStore>,
    /// Bid ledger.
    pub ledger: Arc<BidLedger>,
    /// Presence tracker.
    pub presence: PresenceTracker,
    /// Notification router.
    pub notifications: NotificationRouter,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    config: Arc<RealtimeConfig>,
    joins: RoomJoins,
}

impl std::fmt::Debug for LiveAuctionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveAuctionService")
            .field("joined_rooms", &self.joins.lock().len())
            .finish()
    }
}

impl LiveAuctionService {
    /// Creates a new live auction service over a transport and a store.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn RealtimeTransport>,
        store: Arc<dyn AuctionStore>,
    ) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(ChannelRegistry::new(
            transport,
            config.channel_buffer_size,
            metrics.clone(),
        ));
        let ledger = Arc::new(BidLedger::new(
            store.clone(),
            config.bid_timeout(),
            metrics.clone(),
        ));
        let presence = PresenceTracker::new(registry.clone(), &config);
        let notifications = NotificationRouter::new(
            registry.clone(),
            store.clone(),
            config.notifications.clone(),
        );

        info!("Live auction service initialized");

        Self {
            registry,
            store,
            ledger,
            presence,
            notifications,
            metrics,
            config: Arc::new(config),
            joins: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Subscribe to an auction room.
    pub async fn subscribe_to_auction(
        &self,
        auction_id: AuctionId,
        sink: Arc<dyn RoomEventSink>,
    ) -> AppResult<RoomSubscription> {
        AuctionRoom::subscribe(self, auction_id, sink).await
    }

    /// Announce a participant in an auction room.
    ///
    /// The participant is re-tracked every heartbeat until
    /// [`leave_auction`](Self::leave_auction) or
    /// [`disconnect`](Self::disconnect). Joining again restarts the
    /// heartbeat with a fresh record.
    pub async fn join_auction(&self, auction_id: AuctionId, participant: &Participant) -> AppResult<()> {
        let record = self
            .presence
            .join(auction_id, participant, PresenceStatus::Online)
            .await?;

        let disposer = Disposer::new();
        let beat = spawn_heartbeat(
            self.registry.clone(),
            ChannelType::Auction(auction_id).to_topic(),
            Arc::new(Mutex::new(Some(record))),
            disposer.clone(),
            self.presence.heartbeat_interval(),
            || {},
        );
        let replaced = self
            .joins
            .lock()
            .insert((auction_id, participant.user_id), RoomJoin { disposer, beat });
        if let Some(replaced) = replaced {
            replaced.disposer.dispose();
        }
        Ok(())
    }

    /// Remove a participant from an auction room and stop its heartbeat.
    pub async fn leave_auction(&self, auction_id: AuctionId, user_id: UserId) -> AppResult<()> {
        let joined = self.joins.lock().remove(&(auction_id, user_id));
        if let Some(joined) = joined {
            joined.stop().await;
        }
        self.presence.leave(auction_id, user_id).await
    }

    /// Place a bid. Failures are returned as a rejected outcome, never as
    /// an error.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder: &Participant,
        amount: i64,
    ) -> BidOutcome {
        match self.ledger.place_bid(auction_id, bidder, amount).await {
            Ok(bid) => {
                if self.config.announce_bids {
                    self.announce_bid(bidder, &bid).await;
                }
                BidOutcome::accepted(bid)
            }
            Err(e) => BidOutcome::rejected(&e),
        }
    }

    async fn announce_bid(&self, bidder: &Participant, bid: &Bid) {
        let message = ChatMessage::new(
            bid.auction_id,
            bidder.user_id,
            bidder.username.clone(),
            format!("placed a bid of {}", bid.amount),
            ChatMessageKind::Bid,
        )
        .with_metadata(serde_json::json!({
            "bid_id": bid.id,
            "amount": bid.amount,
        }));

        if let Err(e) = self.broadcast_chat(message).await {
            warn!(auction_id = %bid.auction_id, error = %e, "Failed to announce bid");
        }
    }

    /// Broadcast a chat message to a room.
    ///
    /// The text is trimmed and must be non-empty and within
    /// `max_chat_length` characters. A failed send is logged and returned.
    pub async fn send_chat_message(
        &self,
        room_id: AuctionId,
        author: &Participant,
        message: &str,
        kind: Option<ChatMessageKind>,
    ) -> AppResult<ChatMessage> {
        let text = validate_chat_message(message, self.config.max_chat_length)?;
        let message = ChatMessage::new(
            room_id,
            author.user_id,
            author.username.clone(),
            text,
            kind.unwrap_or_default(),
        );

        match self.broadcast_chat(message.clone()).await {
            Ok(()) => Ok(message),
            Err(e) => {
                warn!(room_id = %room_id, user_id = %author.user_id, error = %e, "Failed to send chat message");
                Err(e)
            }
        }
    }

    async fn broadcast_chat(&self, message: ChatMessage) -> AppResult<()> {
        let topic = ChannelType::Auction(message.room_id).to_topic();
        self.registry
            .publish(&topic, ChannelEvent::ChatMessage { message })
            .await?;
        self.metrics.chat_sent();
        Ok(())
    }

    /// Move an auction to a new status. Rooms observe the change through
    /// the store's auction-update event.
    pub async fn update_auction_status(
        &self,
        auction_id: AuctionId,
        status: AuctionStatus,
    ) -> AppResult<LiveAuction> {
        let auction = self.store.update_status(auction_id, status).await?;
        self.ledger.observe_auction(&auction);
        info!(auction_id = %auction_id, status = %status, "Auction status changed");
        Ok(auction)
    }

    /// Subscribe to a user's notification feed.
    pub async fn subscribe_to_notifications(
        &self,
        user_id: UserId,
        sink: Arc<dyn NotificationSink>,
    ) -> AppResult<NotificationSubscription> {
        self.notifications.subscribe(user_id, sink).await
    }

    /// Start a global presence session.
    pub async fn initialize_presence(&self, participant: Participant) -> AppResult<PresenceSession> {
        self.presence.start_session(participant).await
    }

    /// Leave every room joined through
    /// [`join_auction`](Self::join_auction) and close every channel this
    /// client holds.
    pub async fn disconnect(&self) -> AppResult<()> {
        info!("Disconnecting live auction service");
        let joined: Vec<_> = self.joins.lock().drain().collect();
        for ((auction_id, user_id), join) in joined {
            join.stop().await;
            if let Err(e) = self.presence.leave(auction_id, user_id).await {
                warn!(auction_id = %auction_id, user_id = %user_id, error = %e, "Failed to leave room on disconnect");
            }
        }
        debug!("Room heartbeats stopped");
        self.registry.disconnect().await
    }
}
