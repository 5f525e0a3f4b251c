//! Bid validation and submission.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use bidhub_core::error::{AppError, ErrorKind};
use bidhub_core::result::AppResult;
use bidhub_core::types::id::AuctionId;
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::{Bid, NewBid};
use bidhub_entity::presence::Participant;

use crate::metrics::RealtimeMetrics;
use crate::traits::store::AuctionStore;

use super::price::PriceView;

/// Validates bids against the last confirmed price and submits them to
/// the store.
///
/// The local view is advisory. The store's conditional write decides
/// every race.
#[derive(Debug)]
pub struct BidLedger {
    store: Arc<dyn AuctionStore>,
    prices: DashMap<AuctionId, PriceView>,
    bid_timeout: Duration,
    metrics: Arc<RealtimeMetrics>,
}

impl BidLedger {
    /// Create a ledger over `store`.
    pub fn new(
        store: Arc<dyn AuctionStore>,
        bid_timeout: Duration,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            store,
            prices: DashMap::new(),
            bid_timeout,
            metrics,
        }
    }

    /// Validate and submit a bid.
    ///
    /// Returns the persisted bid once the store has accepted it. The
    /// confirmation every room sees arrives separately on the auction's
    /// channel.
    ///
    /// # Errors
    ///
    /// - `InvalidBid` when the amount does not beat the confirmed price,
    ///   the auction is not live, or the store's condition rejects it.
    /// - `Persistence` when the store fails or `bid_timeout` elapses.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder: &Participant,
        amount: i64,
    ) -> AppResult<Bid> {
        let deadline = Instant::now() + self.bid_timeout;

        let result = self.submit(auction_id, bidder, amount, deadline).await;
        match &result {
            Ok(bid) => {
                self.metrics.bid_accepted();
                info!(
                    auction_id = %auction_id,
                    user_id = %bidder.user_id,
                    amount = bid.amount,
                    "Bid accepted"
                );
            }
            Err(e) => {
                self.metrics.bid_rejected();
                debug!(
                    auction_id = %auction_id,
                    user_id = %bidder.user_id,
                    amount,
                    kind = %e.kind,
                    error = %e.message,
                    "Bid rejected"
                );
            }
        }
        result
    }

    async fn submit(
        &self,
        auction_id: AuctionId,
        bidder: &Participant,
        amount: i64,
        deadline: Instant,
    ) -> AppResult<Bid> {
        if amount <= 0 {
            return Err(AppError::invalid_bid("Bid amount must be positive"));
        }

        let view = match self.price(auction_id) {
            Some(view) => view,
            None => self.seed(auction_id, deadline).await?,
        };
        view.check(amount)?;

        let submission = NewBid {
            auction_id,
            user_id: bidder.user_id,
            username: bidder.username.clone(),
            amount,
        };

        let receipt = match timeout_at(deadline, self.store.insert_bid(submission)).await {
            Err(_) => {
                warn!(auction_id = %auction_id, "Bid submission timed out");
                return Err(self.timed_out());
            }
            Ok(Err(e)) if e.kind == ErrorKind::Conflict => {
                self.refresh(auction_id, deadline).await;
                return Err(AppError::invalid_bid(format!("Outbid: {}", e.message)));
            }
            Ok(Err(e)) if e.kind == ErrorKind::NotFound => {
                self.prices.remove(&auction_id);
                return Err(AppError::invalid_bid(e.message));
            }
            Ok(Err(e)) => {
                warn!(auction_id = %auction_id, error = %e, "Bid write failed");
                return Err(AppError::with_source(
                    ErrorKind::Persistence,
                    format!("Failed to place bid: {}", e.message),
                    e,
                ));
            }
            Ok(Ok(receipt)) => receipt,
        };

        self.reconcile(auction_id, receipt.current_bid, receipt.bid_count);
        Ok(receipt.bid)
    }

    async fn seed(&self, auction_id: AuctionId, deadline: Instant) -> AppResult<PriceView> {
        let auction = match timeout_at(deadline, self.store.get_auction(auction_id)).await {
            Err(_) => return Err(self.timed_out()),
            Ok(Err(e)) => {
                return Err(AppError::with_source(
                    ErrorKind::Persistence,
                    format!("Failed to load auction: {}", e.message),
                    e,
                ));
            }
            Ok(Ok(None)) => {
                return Err(AppError::invalid_bid(format!(
                    "Auction {auction_id} not found"
                )));
            }
            Ok(Ok(Some(auction))) => auction,
        };
        self.observe_auction(&auction);
        Ok(self
            .price(auction_id)
            .unwrap_or_else(|| PriceView::from_auction(&auction)))
    }

    /// Reload the price view after a lost race. Gives up at `deadline`,
    /// leaving the view as it was.
    async fn refresh(&self, auction_id: AuctionId, deadline: Instant) {
        let Ok(reloaded) = timeout_at(deadline, self.store.get_auction(auction_id)).await else {
            warn!(auction_id = %auction_id, "Price view refresh timed out");
            return;
        };
        match reloaded {
            Ok(Some(auction)) => {
                self.observe_auction(&auction);
            }
            Ok(None) => {
                self.prices.remove(&auction_id);
            }
            Err(e) => {
                warn!(auction_id = %auction_id, error = %e, "Failed to refresh price view");
            }
        }
    }

    fn timed_out(&self) -> AppError {
        AppError::persistence(format!(
            "Bid submission timed out after {} ms",
            self.bid_timeout.as_millis()
        ))
    }

    /// Overwrite the cached price with confirmed values.
    ///
    /// Ignored when `bid_count` is older than the cached count or the
    /// auction has never been seen. Returns whether the view changed.
    pub fn reconcile(&self, auction_id: AuctionId, current_bid: i64, bid_count: u64) -> bool {
        match self.prices.get_mut(&auction_id) {
            Some(mut view) => view.confirm(current_bid, bid_count),
            None => false,
        }
    }

    /// Seed or overwrite the cached view from a confirmed auction row.
    pub fn observe_auction(&self, auction: &LiveAuction) -> bool {
        let mut changed = true;
        self.prices
            .entry(auction.id)
            .and_modify(|view| changed = view.observe(auction))
            .or_insert_with(|| PriceView::from_auction(auction));
        changed
    }

    /// The cached view of an auction.
    pub fn price(&self, auction_id: AuctionId) -> Option<PriceView> {
        self.prices.get(&auction_id).map(|view| *view)
    }

    /// Drop the cached view of an auction.
    pub fn forget(&self, auction_id: AuctionId) {
        self.prices.remove(&auction_id);
    }
}
