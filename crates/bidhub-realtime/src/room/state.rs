//! Local state of one subscribed room.

use chrono::{DateTime, Utc};

use bidhub_core::types::id::UserId;
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::ChatMessage;
use bidhub_entity::presence::UserPresence;

use crate::presence::roster::PresenceRoster;

/// Cached auction, bid history, chat transcript and presence of a room.
///
/// Every mutation comes from a confirmed event or the initial seed.
#[derive(Debug, Clone)]
pub struct RoomState {
    auction: LiveAuction,
    bids: Vec<Bid>,
    transcript: Vec<ChatMessage>,
    roster: PresenceRoster,
}

impl RoomState {
    /// Seed from the store's auction row and bid history (oldest first).
    pub fn seed(auction: LiveAuction, bids: Vec<Bid>) -> Self {
        let mut state = Self {
            auction,
            bids,
            transcript: Vec::new(),
            roster: PresenceRoster::new(),
        };
        state.recompute_winning();
        state
    }

    /// Apply a bid-insert event.
    ///
    /// Returns the bid as stored locally, or `None` if it was already
    /// known. A payload whose `bid_count` is older than the cached auction
    /// is recorded without moving the price back.
    pub fn apply_bid(&mut self, bid: Bid, bid_count: u64) -> Option<Bid> {
        if self.bids.iter().any(|b| b.id == bid.id) {
            return None;
        }
        let id = bid.id;
        if bid_count >= self.auction.bid_count {
            self.auction.current_bid = bid.amount;
            self.auction.bid_count = bid_count;
        }
        self.bids.push(bid);
        self.recompute_winning();
        self.bids.iter().find(|b| b.id == id).cloned()
    }

    /// Replace the cached auction wholesale. Ignored if the row is older
    /// than what is held.
    pub fn apply_auction(&mut self, auction: LiveAuction) -> bool {
        if auction.bid_count < self.auction.bid_count {
            return false;
        }
        self.auction = auction;
        self.recompute_winning();
        true
    }

    /// Fold in a fresh seed taken after events were missed.
    ///
    /// Bids not yet held are applied in history order, then the auction
    /// row if it differs from the cached one. Returns the recovered bids as
    /// now held (oldest first) and whether the auction row changed.
    pub fn catch_up(&mut self, fresh: RoomState) -> (Vec<Bid>, bool) {
        let RoomState { auction, bids, .. } = fresh;
        let total = bids.len();
        let mut recovered = Vec::new();
        for (position, bid) in bids.into_iter().enumerate() {
            // The newest bid in the history carries the row's count.
            let behind = (total - 1 - position) as u64;
            let bid_count = auction.bid_count.saturating_sub(behind);
            if let Some(bid) = self.apply_bid(bid, bid_count) {
                recovered.push(bid.id);
            }
        }

        let changed = self.auction != auction && self.apply_auction(auction);
        let recovered = self
            .bids
            .iter()
            .filter(|b| recovered.contains(&b.id))
            .cloned()
            .collect();
        (recovered, changed)
    }

    /// Append a chat message.
    pub fn push_chat(&mut self, message: ChatMessage) {
        self.transcript.push(message);
    }

    /// Replace presence with a snapshot.
    pub fn apply_presence_sync(&mut self, snapshot: Vec<UserPresence>, cutoff: DateTime<Utc>) {
        self.roster.apply_sync(snapshot, cutoff);
    }

    /// Add or refresh one participant. Returns `true` if they are new.
    pub fn apply_presence_join(&mut self, presence: UserPresence) -> bool {
        self.roster.apply_join(presence)
    }

    /// Remove one participant. Returns `true` if they were present.
    pub fn apply_presence_leave(&mut self, user_id: UserId) -> bool {
        self.roster.apply_leave(user_id)
    }

    /// Drop participants not refreshed since `cutoff`.
    pub fn prune_stale(&mut self, cutoff: DateTime<Utc>) -> Vec<UserId> {
        self.roster.prune_stale(cutoff)
    }

    /// The cached auction.
    pub fn auction(&self) -> &LiveAuction {
        &self.auction
    }

    /// Confirmed bids, oldest first.
    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    /// Chat transcript in arrival order.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Current participants.
    pub fn participants(&self) -> Vec<UserPresence> {
        self.roster.participants()
    }

    /// Highest confirmed bid, or the starting bid when there is none.
    pub fn current_highest_bid(&self) -> i64 {
        self.bids
            .iter()
            .map(|b| b.amount)
            .max()
            .unwrap_or(self.auction.starting_bid)
    }

    fn recompute_winning(&mut self) {
        let current = self.auction.current_bid;
        for bid in &mut self.bids {
            bid.is_winning = bid.amount == current;
        }
    }
}
