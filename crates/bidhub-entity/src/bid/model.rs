//! Bid entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bidhub_core::types::id::{AuctionId, BidId, UserId};

/// An accepted bid. Append-only: never mutated or deleted once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    /// Unique bid identifier.
    pub id: BidId,
    /// The auction this bid belongs to.
    pub auction_id: AuctionId,
    /// The bidding user.
    pub user_id: UserId,
    /// Bidder display name.
    pub username: String,
    /// Bid amount in minor currency units.
    pub amount: i64,
    /// When the store accepted the bid.
    pub timestamp: DateTime<Utc>,
    /// Whether this bid is the auction's current price.
    #[serde(default)]
    pub is_winning: bool,
}

/// A bid submission, before the store has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBid {
    /// Target auction.
    pub auction_id: AuctionId,
    /// The bidding user.
    pub user_id: UserId,
    /// Bidder display name.
    pub username: String,
    /// Offered amount in minor currency units.
    pub amount: i64,
}

/// The store's confirmation of an accepted bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    /// The persisted bid.
    pub bid: Bid,
    /// The auction's price after the write.
    pub current_bid: i64,
    /// The auction's bid count after the write.
    pub bid_count: u64,
}
