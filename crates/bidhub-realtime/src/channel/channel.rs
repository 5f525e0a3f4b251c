//! A single opened topic with its live handles.

use std::collections::HashSet;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use bidhub_core::types::id::HandleId;

use crate::message::types::ChannelEvent;
use crate::traits::transport::EventStream;

/// Item fanned out to handles.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// An event published on the topic.
    Event(ChannelEvent),
    /// Events were dropped before reaching the handle. State built from
    /// the stream is incomplete until reloaded.
    Lagged {
        /// Number of events lost.
        skipped: u64,
    },
}

impl Inbound {
    /// The carried event, `None` for a lag marker.
    pub fn into_event(self) -> Option<ChannelEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Lagged { .. } => None,
        }
    }
}

/// One underlying transport subscription, shared by every handle on the
/// same topic.
#[derive(Debug)]
pub struct Channel {
    /// Topic name.
    pub topic: String,
    /// Local fan-out to handles.
    sender: broadcast::Sender<Inbound>,
    /// Handles that have been acquired and not yet released.
    handles: HashSet<HandleId>,
    /// Task forwarding the transport stream into `sender`.
    pump: JoinHandle<()>,
}

impl Channel {
    /// Starts forwarding `upstream` into a fresh local fan-out.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(topic: String, upstream: EventStream, buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        let pump = tokio::spawn(forward(topic.clone(), upstream, sender.clone()));
        Self {
            topic,
            sender,
            handles: HashSet::new(),
            pump,
        }
    }

    /// Registers a new handle and returns its receiver.
    ///
    /// The receiver is created before this returns, so no event forwarded
    /// afterwards can be missed.
    pub fn attach(&mut self, id: HandleId) -> broadcast::Receiver<Inbound> {
        self.handles.insert(id);
        self.sender.subscribe()
    }

    /// Removes a handle. Returns `false` if it was not attached.
    pub fn detach(&mut self, id: HandleId) -> bool {
        self.handles.remove(&id)
    }

    /// Returns the reference count.
    pub fn ref_count(&self) -> usize {
        self.handles.len()
    }

    /// Returns whether no handle is attached.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops forwarding and returns the ids of handles still attached.
    ///
    /// Dropping the returned channel closes every attached receiver.
    pub fn shutdown(self) -> HashSet<HandleId> {
        self.pump.abort();
        self.handles
    }
}

async fn forward(
    topic: String,
    mut upstream: EventStream,
    downstream: broadcast::Sender<Inbound>,
) {
    loop {
        // No receivers is fine: every handle may be between events.
        match upstream.recv().await {
            Ok(event) => {
                let _ = downstream.send(Inbound::Event(event));
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(topic = %topic, skipped, "Transport stream lagged");
                let _ = downstream.send(Inbound::Lagged { skipped });
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!(topic = %topic, "Transport stream closed");
                break;
            }
        }
    }
}
