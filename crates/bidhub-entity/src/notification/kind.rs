//! Notification kind enumeration.

use serde::{Deserialize, Serialize};

/// What triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone placed a higher bid.
    BidOutbid,
    /// A watched auction is about to close.
    AuctionEnding,
    /// The user won an auction.
    AuctionWon,
    /// Someone followed the user.
    NewFollower,
    /// A watchlisted item changed.
    ItemWatchlist,
}

impl NotificationKind {
    /// Return the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BidOutbid => "bid_outbid",
            Self::AuctionEnding => "auction_ending",
            Self::AuctionWon => "auction_won",
            Self::NewFollower => "new_follower",
            Self::ItemWatchlist => "item_watchlist",
        }
    }

    /// Parse a stored kind string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bid_outbid" => Some(Self::BidOutbid),
            "auction_ending" => Some(Self::AuctionEnding),
            "auction_won" => Some(Self::AuctionWon),
            "new_follower" => Some(Self::NewFollower),
            "item_watchlist" => Some(Self::ItemWatchlist),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
