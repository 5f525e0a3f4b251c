//! Chat message value object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bidhub_core::types::id::{AuctionId, ChatMessageId, UserId};

/// Kind of chat line, used by displays to style the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageKind {
    /// Plain user text.
    #[default]
    Message,
    /// Bid announcement.
    Bid,
    /// System notice.
    System,
    /// Emoji reaction.
    Emoji,
}

/// A chat line broadcast to a room. Transient: never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: ChatMessageId,
    /// The room (auction) this message was sent to.
    pub room_id: AuctionId,
    /// The sending user.
    pub user_id: UserId,
    /// Sender display name.
    pub username: String,
    /// Message body.
    pub message: String,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Message kind.
    #[serde(rename = "type", default)]
    pub kind: ChatMessageKind,
    /// Optional structured metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ChatMessage {
    /// Create a new message stamped with the current time.
    pub fn new(
        room_id: AuctionId,
        user_id: UserId,
        username: impl Into<String>,
        message: impl Into<String>,
        kind: ChatMessageKind,
    ) -> Self {
        Self {
            id: ChatMessageId::new(),
            room_id,
            user_id,
            username: username.into(),
            message: message.into(),
            timestamp: Utc::now(),
            kind,
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
