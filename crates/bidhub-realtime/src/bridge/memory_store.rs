//! In-memory auction store.
//!
//! Every write runs under one async lock, and change events are published
//! before the lock is released, so subscribers observe writes in commit
//! order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, BidId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::{Bid, BidReceipt, NewBid};
use bidhub_entity::notification::LiveNotification;

use crate::channel::types::ChannelType;
use crate::message::types::ChannelEvent;
use crate::traits::store::AuctionStore;
use crate::traits::transport::RealtimeTransport;

#[derive(Debug, Default)]
struct Tables {
    auctions: HashMap<AuctionId, LiveAuction>,
    bids: HashMap<AuctionId, Vec<Bid>>,
    notifications: HashMap<UserId, Vec<LiveNotification>>,
}

/// Auction store backed by process memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Change feed target. `None` keeps the store silent.
    transport: Option<Arc<dyn RealtimeTransport>>,
    fail_writes: AtomicBool,
    write_delay: parking_lot::Mutex<Option<Duration>>,
    read_delay: parking_lot::Mutex<Option<Duration>>,
}

impl MemoryStore {
    /// Create a store that publishes no change events.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            transport: None,
            fail_writes: AtomicBool::new(false),
            write_delay: parking_lot::Mutex::new(None),
            read_delay: parking_lot::Mutex::new(None),
        }
    }

    /// Create a store that publishes change events on `transport`.
    pub fn with_transport(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new()
        }
    }

    /// Insert or replace an auction row.
    pub async fn insert_auction(&self, auction: LiveAuction) {
        let mut tables = self.tables.lock().await;
        tables.bids.entry(auction.id).or_default();
        tables.auctions.insert(auction.id, auction);
    }

    /// Make subsequent writes fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every bid write by `delay` before it takes the lock.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Delay every auction read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock() = delay;
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::database("Store is not accepting writes"));
        }
        Ok(())
    }

    async fn emit(&self, topic: ChannelType, event: ChannelEvent) {
        let Some(transport) = &self.transport else {
            return;
        };
        let topic = topic.to_topic();
        if let Err(e) = transport.publish(&topic, event).await {
            // Committed already. Subscribers recover it when they next lag and resync.
            warn!(topic = %topic, error = %e, "Failed to publish change event");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn get_auction(&self, id: AuctionId) -> AppResult<Option<LiveAuction>> {
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.tables.lock().await.auctions.get(&id).cloned())
    }

    async fn list_bids(&self, id: AuctionId) -> AppResult<Vec<Bid>> {
        Ok(self
            .tables
            .lock()
            .await
            .bids
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_bid(&self, new_bid: NewBid) -> AppResult<BidReceipt> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_writable()?;

        let mut tables = self.tables.lock().await;
        let Tables { auctions, bids, .. } = &mut *tables;

        let auction = auctions
            .get_mut(&new_bid.auction_id)
            .ok_or_else(|| AppError::not_found(format!("Auction {} not found", new_bid.auction_id)))?;

        if !auction.status.accepts_bids() {
            return Err(AppError::conflict(format!(
                "Auction {} is {}",
                auction.id, auction.status
            )));
        }
        if new_bid.amount <= auction.current_bid {
            return Err(AppError::conflict(format!(
                "Bid {} does not beat current price {}",
                new_bid.amount, auction.current_bid
            )));
        }

        let bid = Bid {
            id: BidId::new(),
            auction_id: new_bid.auction_id,
            user_id: new_bid.user_id,
            username: new_bid.username,
            amount: new_bid.amount,
            timestamp: Utc::now(),
            is_winning: true,
        };

        let history = bids.entry(auction.id).or_default();
        for previous in history.iter_mut() {
            previous.is_winning = false;
        }
        history.push(bid.clone());

        auction.current_bid = bid.amount;
        auction.bid_count += 1;
        auction.participants = history
            .iter()
            .map(|b| b.user_id)
            .collect::<HashSet<_>>()
            .len() as u32;

        let receipt = BidReceipt {
            bid: bid.clone(),
            current_bid: auction.current_bid,
            bid_count: auction.bid_count,
        };
        let updated = auction.clone();

        debug!(
            auction_id = %updated.id,
            amount = bid.amount,
            bid_count = updated.bid_count,
            "Bid committed"
        );

        let topic = ChannelType::Auction(updated.id);
        self.emit(
            topic,
            ChannelEvent::BidInserted {
                bid,
                bid_count: receipt.bid_count,
            },
        )
        .await;
        self.emit(topic, ChannelEvent::AuctionUpdated { auction: updated })
            .await;
        drop(tables);

        Ok(receipt)
    }

    async fn update_status(&self, id: AuctionId, status: AuctionStatus) -> AppResult<LiveAuction> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let auction = tables
            .auctions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Auction {id} not found")))?;

        if !auction.status.can_transition_to(status) {
            return Err(AppError::conflict(format!(
                "Cannot move auction {id} from {} to {status}",
                auction.status
            )));
        }
        auction.status = status;
        let updated = auction.clone();

        self.emit(
            ChannelType::Auction(id),
            ChannelEvent::AuctionUpdated {
                auction: updated.clone(),
            },
        )
        .await;
        drop(tables);

        Ok(updated)
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<LiveNotification>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .get(&user_id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_notification(&self, notification: LiveNotification) -> AppResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        tables
            .notifications
            .entry(notification.user_id)
            .or_default()
            .push(notification.clone());

        self.emit(
            ChannelType::Notifications(notification.user_id),
            ChannelEvent::NotificationInserted { notification },
        )
        .await;
        drop(tables);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidhub_core::error::ErrorKind;
    use chrono::Duration as ChronoDuration;

    fn auction(current_bid: i64, status: AuctionStatus) -> LiveAuction {
        LiveAuction {
            id: AuctionId::new(),
            title: "Lot 7".into(),
            current_bid,
            starting_bid: current_bid,
            bid_count: 0,
            ends_at: Utc::now() + ChronoDuration::hours(1),
            status,
            seller_id: UserId::new(),
            category: "art".into(),
            participants: 0,
        }
    }

    fn new_bid(auction_id: AuctionId, amount: i64) -> NewBid {
        NewBid {
            auction_id,
            user_id: UserId::new(),
            username: "alice".into(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_conditional_insert() {
        let store = MemoryStore::new();
        let row = auction(100, AuctionStatus::Live);
        let id = row.id;
        store.insert_auction(row).await;

        let receipt = store.insert_bid(new_bid(id, 120)).await.unwrap();
        assert_eq!((receipt.current_bid, receipt.bid_count), (120, 1));

        let err = store.insert_bid(new_bid(id, 120)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        store.insert_bid(new_bid(id, 150)).await.unwrap();
        let bids = store.list_bids(id).await.unwrap();
        assert_eq!(bids.len(), 2);
        assert!(!bids[0].is_winning);
        assert!(bids[1].is_winning);
        assert_eq!(store.get_auction(id).await.unwrap().unwrap().participants, 2);
    }

    #[tokio::test]
    async fn test_bids_need_live_auction() {
        let store = MemoryStore::new();
        let row = auction(100, AuctionStatus::Upcoming);
        let id = row.id;
        store.insert_auction(row).await;

        let err = store.insert_bid(new_bid(id, 500)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        store.update_status(id, AuctionStatus::Live).await.unwrap();
        assert!(store.insert_bid(new_bid(id, 500)).await.is_ok());

        store.update_status(id, AuctionStatus::Ended).await.unwrap();
        let err = store
            .update_status(id, AuctionStatus::Live)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_auction() {
        let store = MemoryStore::new();
        let err = store
            .insert_bid(new_bid(AuctionId::new(), 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        use bidhub_entity::notification::NotificationKind;

        let store = MemoryStore::new();
        let user = UserId::new();
        for title in ["one", "two", "three"] {
            store
                .insert_notification(LiveNotification::new(
                    user,
                    NotificationKind::BidOutbid,
                    title,
                    "body",
                ))
                .await
                .unwrap();
        }
        let rows = store.list_notifications(user, 2).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["three", "two"]);
    }
}
