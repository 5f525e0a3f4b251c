//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use bidhub_core::config::RealtimeConfig;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::ChatMessage;
use bidhub_entity::notification::LiveNotification;
use bidhub_entity::presence::{Participant, UserPresence};
use bidhub_realtime::channel::Disposer;
use bidhub_realtime::{
    LiveAuctionService, MemoryStore, MemoryTransport, NotificationSink, RoomEventSink,
};

/// One simulated realtime backend shared by any number of clients.
pub struct TestApp {
    /// Shared pub/sub
    pub transport: Arc<MemoryTransport>,
    /// Shared store, publishing change events on `transport`
    pub store: Arc<MemoryStore>,
    /// Engine config handed to every client
    pub config: RealtimeConfig,
}

impl TestApp {
    /// Create a backend with default config
    pub fn new() -> Self {
        Self::with_config(RealtimeConfig::default())
    }

    /// Create a backend with a custom config
    pub fn with_config(config: RealtimeConfig) -> Self {
        let transport = Arc::new(MemoryTransport::new(config.channel_buffer_size));
        let store = Arc::new(MemoryStore::with_transport(transport.clone()));
        Self {
            transport,
            store,
            config,
        }
    }

    /// Connect a new client
    pub fn client(&self) -> LiveAuctionService {
        LiveAuctionService::new(
            self.config.clone(),
            self.transport.clone(),
            self.store.clone(),
        )
    }

    /// Insert a live auction priced at `current_bid`
    pub async fn live_auction(&self, current_bid: i64) -> LiveAuction {
        self.auction_with_status(current_bid, AuctionStatus::Live)
            .await
    }

    /// Insert an auction with the given status
    pub async fn auction_with_status(&self, current_bid: i64, status: AuctionStatus) -> LiveAuction {
        let auction = LiveAuction {
            id: AuctionId::new(),
            title: "Mid-century walnut sideboard".into(),
            current_bid,
            starting_bid: current_bid,
            bid_count: 0,
            ends_at: Utc::now() + chrono::Duration::hours(2),
            status,
            seller_id: UserId::new(),
            category: "furniture".into(),
            participants: 0,
        };
        self.store.insert_auction(auction.clone()).await;
        auction
    }
}

/// Create a participant with a fresh id
pub fn participant(name: &str) -> Participant {
    Participant::new(UserId::new(), name)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Room sink recording every callback
#[derive(Default)]
pub struct RoomSpy {
    pub bids: Mutex<Vec<Bid>>,
    pub auctions: Mutex<Vec<LiveAuction>>,
    pub chats: Mutex<Vec<ChatMessage>>,
    pub joins: Mutex<Vec<UserId>>,
    pub leaves: Mutex<Vec<UserId>>,
    pub syncs: AtomicUsize,
    /// Disposed on the first bid update when set
    pub dispose_on_bid: Mutex<Option<Disposer>>,
}

impl RoomSpy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bid_count(&self) -> usize {
        self.bids.lock().len()
    }

    pub fn chat_count(&self) -> usize {
        self.chats.lock().len()
    }

    pub fn total_callbacks(&self) -> usize {
        self.bids.lock().len()
            + self.auctions.lock().len()
            + self.chats.lock().len()
            + self.joins.lock().len()
            + self.leaves.lock().len()
            + self.syncs.load(Ordering::SeqCst)
    }
}

impl RoomEventSink for RoomSpy {
    fn on_bid_update(&self, bid: &Bid) {
        self.bids.lock().push(bid.clone());
        if let Some(disposer) = self.dispose_on_bid.lock().as_ref() {
            disposer.dispose();
        }
    }

    fn on_auction_update(&self, auction: &LiveAuction) {
        self.auctions.lock().push(auction.clone());
    }

    fn on_chat_message(&self, message: &ChatMessage) {
        self.chats.lock().push(message.clone());
    }

    fn on_participant_join(&self, user_id: UserId) {
        self.joins.lock().push(user_id);
    }

    fn on_participant_leave(&self, user_id: UserId) {
        self.leaves.lock().push(user_id);
    }

    fn on_presence_sync(&self, _participants: &[UserPresence]) {
        self.syncs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Notification sink recording every arrival
#[derive(Default)]
pub struct NotificationSpy {
    pub received: Mutex<Vec<LiveNotification>>,
    pub last_unread: AtomicUsize,
}

impl NotificationSpy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

impl NotificationSink for NotificationSpy {
    fn on_notification(&self, notification: &LiveNotification) {
        self.received.lock().push(notification.clone());
    }

    fn on_unread_count(&self, unread: usize) {
        self.last_unread.store(unread, Ordering::SeqCst);
    }
}
