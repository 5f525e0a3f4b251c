//! Real-time auction engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (live auction) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Per-topic fan-out buffer size.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Upper bound on a single bid submission round-trip, in milliseconds.
    #[serde(default = "default_bid_timeout")]
    pub bid_timeout_ms: u64,
    /// Interval between client presence re-track heartbeats, in seconds.
    #[serde(default = "default_presence_heartbeat")]
    pub presence_heartbeat_seconds: u64,
    /// Age after which an un-refreshed presence entry is considered stale.
    #[serde(default = "default_presence_timeout")]
    pub presence_timeout_seconds: u64,
    /// Maximum chat message length in characters.
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
    /// Whether accepted bids are announced in the room chat.
    #[serde(default = "default_true")]
    pub announce_bids: bool,
    /// Notification-specific settings.
    #[serde(default)]
    pub notifications: NotificationRealtimeConfig,
}

/// Notification feed settings for the real-time engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRealtimeConfig {
    /// Maximum notifications kept in a user's local feed.
    #[serde(default = "default_max_stored")]
    pub max_stored_per_user: usize,
    /// How many stored notifications seed a feed on subscribe.
    #[serde(default = "default_initial_fetch")]
    pub initial_fetch_limit: usize,
}

impl RealtimeConfig {
    /// Bid submission timeout as a [`Duration`].
    pub fn bid_timeout(&self) -> Duration {
        Duration::from_millis(self.bid_timeout_ms)
    }

    /// Presence heartbeat interval as a [`Duration`].
    pub fn presence_heartbeat(&self) -> Duration {
        Duration::from_secs(self.presence_heartbeat_seconds)
    }

    /// Presence staleness timeout as a [`Duration`].
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
            bid_timeout_ms: default_bid_timeout(),
            presence_heartbeat_seconds: default_presence_heartbeat(),
            presence_timeout_seconds: default_presence_timeout(),
            max_chat_length: default_max_chat_length(),
            announce_bids: true,
            notifications: NotificationRealtimeConfig::default(),
        }
    }
}

impl Default for NotificationRealtimeConfig {
    fn default() -> Self {
        Self {
            max_stored_per_user: default_max_stored(),
            initial_fetch_limit: default_initial_fetch(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}

fn default_bid_timeout() -> u64 {
    10_000
}

fn default_presence_heartbeat() -> u64 {
    30
}

fn default_presence_timeout() -> u64 {
    90
}

fn default_max_chat_length() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_max_stored() -> usize {
    100
}

fn default_initial_fetch() -> usize {
    50
}
