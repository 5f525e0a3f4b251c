//! Confirmed price view of one auction.

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_entity::auction::{AuctionStatus, LiveAuction};

/// The last confirmed price of an auction as seen by this client.
///
/// Only ever overwritten with values the store has confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceView {
    /// Highest accepted bid.
    pub current_bid: i64,
    /// Accepted bid count.
    pub bid_count: u64,
    /// Lifecycle status.
    pub status: AuctionStatus,
}

impl PriceView {
    /// Build a view from an auction row.
    pub fn from_auction(auction: &LiveAuction) -> Self {
        Self {
            current_bid: auction.current_bid,
            bid_count: auction.bid_count,
            status: auction.status,
        }
    }

    /// Optimistic validation of an amount against this view.
    pub fn check(&self, amount: i64) -> AppResult<()> {
        if amount <= 0 {
            return Err(AppError::invalid_bid("Bid amount must be positive"));
        }
        if !self.status.accepts_bids() {
            return Err(AppError::invalid_bid(format!(
                "Auction is {} and not accepting bids",
                self.status
            )));
        }
        if amount <= self.current_bid {
            return Err(AppError::invalid_bid(format!(
                "Bid must be higher than current bid of {}",
                self.current_bid
            )));
        }
        Ok(())
    }

    /// Overwrite the price with confirmed values unless they are older than
    /// what is already held. Returns whether the view changed.
    pub fn confirm(&mut self, current_bid: i64, bid_count: u64) -> bool {
        if bid_count < self.bid_count {
            return false;
        }
        let changed = self.current_bid != current_bid || self.bid_count != bid_count;
        self.current_bid = current_bid;
        self.bid_count = bid_count;
        changed
    }

    /// Replace the whole view with a confirmed auction row, unless the row
    /// is older than the held price.
    pub fn observe(&mut self, auction: &LiveAuction) -> bool {
        if auction.bid_count < self.bid_count {
            return false;
        }
        let next = Self::from_auction(auction);
        let changed = *self != next;
        *self = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(current_bid: i64, bid_count: u64) -> PriceView {
        PriceView {
            current_bid,
            bid_count,
            status: AuctionStatus::Live,
        }
    }

    #[test]
    fn test_check_rules() {
        let view = live(100, 0);
        assert!(view.check(101).is_ok());
        assert!(view.check(100).is_err());
        assert!(view.check(-5).is_err());

        let ended = PriceView {
            status: AuctionStatus::Ended,
            ..view
        };
        assert!(ended.check(1_000).is_err());
    }

    #[test]
    fn test_confirm_ignores_older_counts() {
        let mut view = live(150, 2);
        assert!(!view.confirm(120, 1));
        assert_eq!(view, live(150, 2));

        assert!(!view.confirm(150, 2));
        assert!(view.confirm(180, 3));
        assert_eq!(view, live(180, 3));
    }
}
