//! Event payloads carried over pub/sub channels.

use serde::{Deserialize, Serialize};

use bidhub_core::types::id::UserId;
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::ChatMessage;
use bidhub_entity::notification::LiveNotification;
use bidhub_entity::presence::UserPresence;

/// Every event kind that can arrive on a channel.
///
/// Auction topics carry bid inserts, auction updates, chat broadcasts, and
/// presence events. Notification topics carry notification inserts. The
/// global presence topic carries presence events only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// The store accepted a bid.
    BidInserted {
        /// The persisted bid.
        bid: Bid,
        /// The auction's bid count after this insert.
        bid_count: u64,
    },
    /// The store changed an auction row.
    AuctionUpdated {
        /// The full auction row after the change.
        auction: LiveAuction,
    },
    /// A chat broadcast.
    ChatMessage {
        /// The message.
        message: ChatMessage,
    },
    /// Full presence snapshot for the topic.
    PresenceSync {
        /// Everyone currently tracked.
        participants: Vec<UserPresence>,
    },
    /// A participant started (or refreshed) tracking.
    PresenceJoin {
        /// The tracked record.
        presence: UserPresence,
    },
    /// A participant stopped tracking.
    PresenceLeave {
        /// The departed user.
        user_id: UserId,
    },
    /// The store created a notification.
    NotificationInserted {
        /// The notification row.
        notification: LiveNotification,
    },
}

impl ChannelEvent {
    /// The wire name of this event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BidInserted { .. } => "bid_inserted",
            Self::AuctionUpdated { .. } => "auction_updated",
            Self::ChatMessage { .. } => "chat_message",
            Self::PresenceSync { .. } => "presence_sync",
            Self::PresenceJoin { .. } => "presence_join",
            Self::PresenceLeave { .. } => "presence_leave",
            Self::NotificationInserted { .. } => "notification_inserted",
        }
    }

    /// Whether this is a presence event.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            Self::PresenceSync { .. } | Self::PresenceJoin { .. } | Self::PresenceLeave { .. }
        )
    }
}
