//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Underlying transport channels opened
    pub channels_opened: AtomicU64,
    /// Underlying transport channels closed
    pub channels_closed: AtomicU64,
    /// Events handed to a sink
    pub events_delivered: AtomicU64,
    /// Events discarded because their subscription was torn down
    pub events_dropped: AtomicU64,
    /// Subscriptions reloaded from the store after falling behind
    pub resyncs: AtomicU64,
    /// Bids accepted by the store
    pub bids_accepted: AtomicU64,
    /// Bids rejected locally or by the store condition
    pub bids_rejected: AtomicU64,
    /// Chat messages broadcast
    pub chat_messages_sent: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an underlying channel open
    pub fn channel_opened(&self) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an underlying channel close
    pub fn channel_closed(&self) {
        self.channels_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered event
    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped event
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a subscription reloaded after lag
    pub fn resynced(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted bid
    pub fn bid_accepted(&self) {
        self.bids_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected bid
    pub fn bid_rejected(&self) {
        self.bids_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat broadcast
    pub fn chat_sent(&self) {
        self.chat_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
            channels_closed: self.channels_closed.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            bids_accepted: self.bids_accepted.load(Ordering::Relaxed),
            bids_rejected: self.bids_rejected.load(Ordering::Relaxed),
            chat_messages_sent: self.chat_messages_sent.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Underlying transport channels opened
    pub channels_opened: u64,
    /// Underlying transport channels closed
    pub channels_closed: u64,
    /// Events handed to a sink
    pub events_delivered: u64,
    /// Events discarded after teardown
    pub events_dropped: u64,
    /// Lag recoveries
    pub resyncs: u64,
    /// Bids accepted by the store
    pub bids_accepted: u64,
    /// Bids rejected
    pub bids_rejected: u64,
    /// Chat messages broadcast
    pub chat_messages_sent: u64,
}

impl MetricsSnapshot {
    /// Channels currently open according to the counters
    pub fn channels_live(&self) -> u64 {
        self.channels_opened.saturating_sub(self.channels_closed)
    }
}
