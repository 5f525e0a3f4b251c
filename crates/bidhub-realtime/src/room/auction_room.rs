//! Per-auction session: one registry-issued channel, seeded state, and a
//! dispatcher feeding a [`RoomEventSink`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::{ChatMessage, ChatMessageKind};
use bidhub_entity::presence::{Participant, PresenceStatus, UserPresence};

use crate::channel::handle::ChannelHandle;
use crate::channel::subscription::{Disposer, EventHandler, Subscription, spawn_dispatcher};
use crate::channel::types::ChannelType;
use crate::message::types::ChannelEvent;
use crate::presence::heartbeat::{TrackedPresence, spawn_heartbeat};
use crate::server::{BidOutcome, LiveAuctionService};

use super::sink::RoomEventSink;
use super::state::RoomState;

/// A live subscription to one auction room.
///
/// Dropping the room silences its callbacks and, inside a tokio runtime,
/// leaves the room in the background. [`close`](Self::close) leaves and
/// waits for the channel to be released.
#[derive(Debug)]
pub struct AuctionRoom {
    auction_id: AuctionId,
    service: LiveAuctionService,
    state: Arc<Mutex<RoomState>>,
    tracked: TrackedPresence,
    subscription: Subscription,
}

impl AuctionRoom {
    /// Attach to `auction:{auction_id}`, seed state from the store, and
    /// start delivering events to `sink`.
    ///
    /// Seeding does not invoke the sink. Events committed while seeding are
    /// applied once.
    ///
    /// # Errors
    ///
    /// `Channel` if the topic cannot be opened, `NotFound` for an unknown
    /// auction, or the store's error if seeding fails. Nothing is left
    /// acquired on failure.
    pub async fn subscribe(
        service: &LiveAuctionService,
        auction_id: AuctionId,
        sink: Arc<dyn RoomEventSink>,
    ) -> AppResult<Self> {
        let topic = ChannelType::Auction(auction_id).to_topic();
        let registry = service.registry.clone();
        let handle = registry.acquire(&topic).await?;

        let seeded = match Self::seed(service, auction_id).await {
            Ok(state) => state,
            Err(e) => {
                Self::abandon(service, &handle).await;
                return Err(e);
            }
        };
        service.ledger.observe_auction(seeded.auction());

        let state = Arc::new(Mutex::new(seeded));
        let tracked: TrackedPresence = Arc::new(Mutex::new(None));
        let disposer = Disposer::new();
        let subscription = Subscription::new(topic.clone(), disposer.clone());

        let handler = RoomEvents {
            service: service.clone(),
            auction_id,
            state: state.clone(),
            sink: sink.clone(),
        };
        subscription.push_task(spawn_dispatcher(
            registry.clone(),
            handle,
            disposer.clone(),
            handler,
        ));

        let prune = {
            let state = state.clone();
            let presence = service.presence.clone();
            move || {
                let removed = state.lock().prune_stale(presence.stale_cutoff(Utc::now()));
                for user_id in removed {
                    sink.on_participant_leave(user_id);
                }
            }
        };
        subscription.push_task(spawn_heartbeat(
            registry,
            topic,
            tracked.clone(),
            disposer,
            service.presence.heartbeat_interval(),
            prune,
        ));

        info!(auction_id = %auction_id, "Subscribed to auction room");
        Ok(Self {
            auction_id,
            service: service.clone(),
            state,
            tracked,
            subscription,
        })
    }

    async fn seed(service: &LiveAuctionService, auction_id: AuctionId) -> AppResult<RoomState> {
        let auction = service
            .store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Auction {auction_id} not found")))?;
        let bids = service.store.list_bids(auction_id).await?;
        debug!(auction_id = %auction_id, bids = bids.len(), "Seeded room state");
        Ok(RoomState::seed(auction, bids))
    }

    async fn abandon(service: &LiveAuctionService, handle: &ChannelHandle) {
        if let Err(e) = service.registry.release(handle).await {
            warn!(topic = %handle.topic(), error = %e, "Failed to release room handle");
        }
    }

    /// The auction this room is attached to.
    pub fn auction_id(&self) -> AuctionId {
        self.auction_id
    }

    /// The cached auction row.
    pub fn auction(&self) -> LiveAuction {
        self.state.lock().auction().clone()
    }

    /// Confirmed bids, oldest first.
    pub fn bids(&self) -> Vec<Bid> {
        self.state.lock().bids().to_vec()
    }

    /// Chat transcript in arrival order.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.state.lock().transcript().to_vec()
    }

    /// Current participants.
    pub fn participants(&self) -> Vec<UserPresence> {
        self.state.lock().participants()
    }

    /// Highest confirmed bid, or the starting bid when there is none.
    pub fn current_highest_bid(&self) -> i64 {
        self.state.lock().current_highest_bid()
    }

    /// Track `participant` in this room. Re-tracked every heartbeat until
    /// [`leave`](Self::leave) or [`close`](Self::close).
    ///
    /// On failure the participant stays absent.
    pub async fn join(&self, participant: &Participant, status: PresenceStatus) -> AppResult<()> {
        let record = self
            .service
            .presence
            .join(self.auction_id, participant, status)
            .await?;
        *self.tracked.lock() = Some(record);
        Ok(())
    }

    /// Stop tracking the joined participant, if any.
    pub async fn leave(&self) -> AppResult<()> {
        let record = self.tracked.lock().take();
        let Some(record) = record else {
            return Ok(());
        };
        self.service
            .presence
            .leave(self.auction_id, record.user_id)
            .await
    }

    /// The participant currently joined through this room.
    pub fn joined_user(&self) -> Option<UserId> {
        self.tracked.lock().as_ref().map(|p| p.user_id)
    }

    /// Place a bid in this room.
    pub async fn place_bid(&self, bidder: &Participant, amount: i64) -> BidOutcome {
        self.service.place_bid(self.auction_id, bidder, amount).await
    }

    /// Broadcast a chat message to this room.
    pub async fn send_chat_message(
        &self,
        author: &Participant,
        message: &str,
        kind: Option<ChatMessageKind>,
    ) -> AppResult<ChatMessage> {
        self.service
            .send_chat_message(self.auction_id, author, message, kind)
            .await
    }

    /// A clone of the teardown trigger, usable from inside callbacks.
    pub fn disposer(&self) -> Disposer {
        self.subscription.disposer()
    }

    /// Whether callbacks are still delivered.
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Synchronously silence every callback.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Silence callbacks, leave the room, and wait for the channel handle to
    /// be released.
    pub async fn close(&self) {
        self.subscription.close().await;
        if let Err(e) = self.leave().await {
            warn!(auction_id = %self.auction_id, error = %e, "Failed to leave room on close");
        }
        info!(auction_id = %self.auction_id, "Auction room closed");
    }
}

impl Drop for AuctionRoom {
    fn drop(&mut self) {
        let record = self.tracked.lock().take();
        let Some(record) = record else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                auction_id = %self.auction_id,
                user_id = %record.user_id,
                "Room dropped outside a runtime; participant stays tracked until stale"
            );
            return;
        };

        let presence = self.service.presence.clone();
        let auction_id = self.auction_id;
        runtime.spawn(async move {
            if let Err(e) = presence.leave(auction_id, record.user_id).await {
                warn!(auction_id = %auction_id, error = %e, "Failed to leave dropped room");
            }
        });
    }
}

/// Applies `auction:{id}` events to a room's state and sink.
struct RoomEvents {
    service: LiveAuctionService,
    auction_id: AuctionId,
    state: Arc<Mutex<RoomState>>,
    sink: Arc<dyn RoomEventSink>,
}

#[async_trait]
impl EventHandler for RoomEvents {
    type Snapshot = RoomState;

    fn on_event(&mut self, event: ChannelEvent) {
        let (service, auction_id, state, sink) =
            (&self.service, self.auction_id, &self.state, self.sink.as_ref());
        match event {
            ChannelEvent::BidInserted { bid, bid_count } => {
                let applied = state.lock().apply_bid(bid, bid_count);
                let Some(bid) = applied else {
                    return;
                };
                let (current_bid, count) = {
                    let state = state.lock();
                    (state.auction().current_bid, state.auction().bid_count)
                };
                service.ledger.reconcile(auction_id, current_bid, count);
                sink.on_bid_update(&bid);
            }
            ChannelEvent::AuctionUpdated { auction } => {
                let applied = state.lock().apply_auction(auction.clone());
                if applied {
                    service.ledger.observe_auction(&auction);
                    sink.on_auction_update(&auction);
                }
            }
            ChannelEvent::ChatMessage { message } => {
                state.lock().push_chat(message.clone());
                sink.on_chat_message(&message);
            }
            ChannelEvent::PresenceSync { participants } => {
                let cutoff = service.presence.stale_cutoff(Utc::now());
                let snapshot = {
                    let mut state = state.lock();
                    state.apply_presence_sync(participants, cutoff);
                    state.participants()
                };
                sink.on_presence_sync(&snapshot);
            }
            ChannelEvent::PresenceJoin { presence } => {
                let user_id = presence.user_id;
                let added = state.lock().apply_presence_join(presence);
                if added {
                    sink.on_participant_join(user_id);
                }
            }
            ChannelEvent::PresenceLeave { user_id } => {
                let removed = state.lock().apply_presence_leave(user_id);
                if removed {
                    sink.on_participant_leave(user_id);
                }
            }
            other => {
                debug!(auction_id = %auction_id, event = other.name(), "Ignoring event on room channel");
            }
        }
    }

    async fn resync(&mut self) -> AppResult<Option<RoomState>> {
        AuctionRoom::seed(&self.service, self.auction_id).await.map(Some)
    }

    /// Missed chat is not recoverable; presence heals on the next sync.
    fn on_resync(&mut self, fresh: RoomState) {
        let (recovered, changed, auction) = {
            let mut state = self.state.lock();
            let (recovered, changed) = state.catch_up(fresh);
            (recovered, changed, state.auction().clone())
        };
        if changed {
            self.service.ledger.observe_auction(&auction);
        } else if !recovered.is_empty() {
            self.service
                .ledger
                .reconcile(self.auction_id, auction.current_bid, auction.bid_count);
        }
        info!(
            auction_id = %self.auction_id,
            recovered = recovered.len(),
            "Room caught up after lag"
        );

        for bid in &recovered {
            self.sink.on_bid_update(bid);
        }
        if changed {
            self.sink.on_auction_update(&auction);
        }
    }
}
