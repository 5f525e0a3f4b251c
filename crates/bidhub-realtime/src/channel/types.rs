//! Topic naming and parsing.

use serde::{Deserialize, Serialize};

use bidhub_core::types::id::{AuctionId, UserId};

/// Typed topic identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum ChannelType {
    /// Auction room: bids, auction updates, chat, presence.
    Auction(AuctionId),
    /// A user's notification feed.
    Notifications(UserId),
    /// Site-wide online/away presence.
    GlobalPresence,
}

impl ChannelType {
    /// Parses a topic string into a typed channel.
    pub fn parse(topic: &str) -> Option<Self> {
        if topic == "global_presence" {
            return Some(ChannelType::GlobalPresence);
        }
        let parts: Vec<&str> = topic.splitn(2, ':').collect();
        match parts.as_slice() {
            ["auction", id] => id.parse().ok().map(ChannelType::Auction),
            ["notifications", id] => id.parse().ok().map(ChannelType::Notifications),
            _ => None,
        }
    }

    /// Converts back to a topic string.
    pub fn to_topic(&self) -> String {
        match self {
            ChannelType::Auction(id) => format!("auction:{id}"),
            ChannelType::Notifications(id) => format!("notifications:{id}"),
            ChannelType::GlobalPresence => "global_presence".to_string(),
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_topic())
    }
}
