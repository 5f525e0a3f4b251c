//! Reference-counted handle on an opened topic.

use tokio::sync::broadcast;

use bidhub_core::types::id::HandleId;

use super::channel::Inbound;

/// A consumer's claim on one topic, issued by
/// [`ChannelRegistry::acquire`](super::registry::ChannelRegistry::acquire).
///
/// Every handle must be given back through
/// [`ChannelRegistry::release`](super::registry::ChannelRegistry::release)
/// exactly once.
#[derive(Debug)]
pub struct ChannelHandle {
    id: HandleId,
    topic: String,
    receiver: broadcast::Receiver<Inbound>,
}

impl ChannelHandle {
    pub(crate) fn new(
        id: HandleId,
        topic: String,
        receiver: broadcast::Receiver<Inbound>,
    ) -> Self {
        Self {
            id,
            topic,
            receiver,
        }
    }

    /// Returns the handle id.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Returns the topic this handle is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next item on the topic.
    ///
    /// Returns `None` once the channel has been torn down. If this handle
    /// fell behind, the events it missed are reported as one
    /// [`Inbound::Lagged`] before delivery resumes.
    pub async fn next_event(&mut self) -> Option<Inbound> {
        match self.receiver.recv().await {
            Ok(inbound) => Some(inbound),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    topic = %self.topic,
                    handle = %self.id,
                    skipped,
                    "Handle lagged behind channel"
                );
                Some(Inbound::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Returns an item if one is already buffered.
    pub fn try_next_event(&mut self) -> Option<Inbound> {
        match self.receiver.try_recv() {
            Ok(inbound) => Some(inbound),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => Some(Inbound::Lagged { skipped }),
            Err(_) => None,
        }
    }
}
