//! Pub/sub transport trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use bidhub_core::result::AppResult;
use bidhub_core::types::id::UserId;
use bidhub_entity::presence::UserPresence;

use crate::message::types::ChannelEvent;

/// Receiving end of one opened topic.
pub type EventStream = broadcast::Receiver<ChannelEvent>;

/// The network-level pub/sub service rooms and feeds are built on.
///
/// Events published on one topic must be delivered to every open stream
/// of that topic in publish order. Presence is tracked per topic: a
/// `track` produces a `PresenceJoin` followed by a `PresenceSync`, an
/// `untrack` a `PresenceLeave` followed by a `PresenceSync`.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Open (subscribe to) a topic.
    async fn open(&self, topic: &str) -> AppResult<EventStream>;

    /// Close a topic previously opened by this client.
    async fn close(&self, topic: &str) -> AppResult<()>;

    /// Broadcast an event to every subscriber of a topic.
    async fn publish(&self, topic: &str, event: ChannelEvent) -> AppResult<()>;

    /// Track (or refresh) a presence record on a topic.
    async fn track(&self, topic: &str, presence: UserPresence) -> AppResult<()>;

    /// Stop tracking a user on a topic.
    async fn untrack(&self, topic: &str, user_id: UserId) -> AppResult<()>;
}
