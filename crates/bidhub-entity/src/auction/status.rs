//! Auction lifecycle status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use bidhub_core::error::AppError;

/// Lifecycle status of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    /// Scheduled but not yet accepting bids.
    Upcoming,
    /// Open for bidding.
    Live,
    /// Closed; no further bids are accepted.
    Ended,
}

impl AuctionStatus {
    /// Whether bids may be placed in this status.
    pub fn accepts_bids(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Whether `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: AuctionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Live) | (Self::Live, Self::Ended) | (Self::Upcoming, Self::Ended)
        )
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }
}

impl FromStr for AuctionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "live" => Ok(Self::Live),
            "ended" => Ok(Self::Ended),
            other => Err(AppError::validation(format!(
                "Unknown auction status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
