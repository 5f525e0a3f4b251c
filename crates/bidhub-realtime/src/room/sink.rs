//! Callback surface of an auction room.

use bidhub_core::types::id::UserId;
use bidhub_entity::auction::LiveAuction;
use bidhub_entity::bid::Bid;
use bidhub_entity::chat::ChatMessage;
use bidhub_entity::presence::UserPresence;

/// Receives typed room events.
///
/// All methods run on the room's dispatcher task, one at a time, after the
/// room's local state already reflects the event. Implementations may read
/// the room and may dispose it, but must not block.
pub trait RoomEventSink: Send + Sync + 'static {
    /// A confirmed bid arrived.
    fn on_bid_update(&self, _bid: &Bid) {}

    /// The auction row changed.
    fn on_auction_update(&self, _auction: &LiveAuction) {}

    /// A chat message was broadcast.
    fn on_chat_message(&self, _message: &ChatMessage) {}

    /// A participant appeared.
    fn on_participant_join(&self, _user_id: UserId) {}

    /// A participant left or timed out.
    fn on_participant_leave(&self, _user_id: UserId) {}

    /// The full participant list was replaced.
    fn on_presence_sync(&self, _participants: &[UserPresence]) {}
}

/// A sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl RoomEventSink for NoopSink {}
