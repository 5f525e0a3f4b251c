//! Live auction entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bidhub_core::types::id::{AuctionId, UserId};

use super::AuctionStatus;

/// An auction as owned by the store.
///
/// The real-time core only ever holds a cached copy, replaced wholesale on
/// every auction-update event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAuction {
    /// Unique auction identifier.
    pub id: AuctionId,
    /// Display title.
    pub title: String,
    /// Highest accepted bid (equals `starting_bid` until the first bid).
    pub current_bid: i64,
    /// Opening price.
    pub starting_bid: i64,
    /// Number of bids accepted by the store.
    pub bid_count: u64,
    /// When bidding closes.
    pub ends_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: AuctionStatus,
    /// The selling user.
    pub seller_id: UserId,
    /// Catalog category.
    pub category: String,
    /// Number of distinct bidders.
    pub participants: u32,
}

impl LiveAuction {
    /// Seconds until bidding closes, clamped at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.ends_at - now).num_seconds().max(0)
    }

    /// The smallest amount that would currently be accepted.
    pub fn minimum_next_bid(&self) -> i64 {
        self.current_bid.saturating_add(1)
    }
}
