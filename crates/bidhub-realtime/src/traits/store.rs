//! Row-store trait for auctions, bids, and notifications.

use async_trait::async_trait;

use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::{Bid, BidReceipt, NewBid};
use bidhub_entity::notification::LiveNotification;

/// The authoritative store behind the live engine.
///
/// Writes are the store's responsibility to serialize. After a successful
/// write an implementation publishes the matching change event on the
/// affected topic (`auction:{id}` or `notifications:{user_id}`), in commit
/// order.
#[async_trait]
pub trait AuctionStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch an auction row.
    async fn get_auction(&self, id: AuctionId) -> AppResult<Option<LiveAuction>>;

    /// List the accepted bids of an auction, oldest first.
    async fn list_bids(&self, id: AuctionId) -> AppResult<Vec<Bid>>;

    /// Insert a bid if and only if it beats the current price of a live
    /// auction.
    ///
    /// Fails with `ErrorKind::Conflict` when the condition does not hold at
    /// write time and `ErrorKind::NotFound` for an unknown auction.
    async fn insert_bid(&self, bid: NewBid) -> AppResult<BidReceipt>;

    /// Move an auction to a new lifecycle status.
    async fn update_status(&self, id: AuctionId, status: AuctionStatus) -> AppResult<LiveAuction>;

    /// List a user's notifications, newest first.
    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<LiveNotification>>;

    /// Create a notification.
    async fn insert_notification(&self, notification: LiveNotification) -> AppResult<()>;
}
