//! Channel registry: reference-counted ownership of transport topics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{HandleId, UserId};
use bidhub_entity::presence::UserPresence;

use crate::message::types::ChannelEvent;
use crate::message::validator::validate_topic;
use crate::metrics::RealtimeMetrics;
use crate::traits::transport::RealtimeTransport;

use super::channel::Channel;
use super::handle::ChannelHandle;

/// Registry of all topics this client has open.
///
/// `acquire` and `release` are serialized by one async lock that is held
/// across the transport call, so two concurrent acquires of the same topic
/// open exactly one underlying subscription.
#[derive(Debug)]
pub struct ChannelRegistry {
    /// Network pub/sub.
    transport: Arc<dyn RealtimeTransport>,
    /// Topic → open channel, plus handles retired by `disconnect`.
    state: Mutex<RegistryState>,
    /// Local fan-out buffer size.
    buffer_size: usize,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
}

#[derive(Debug, Default)]
struct RegistryState {
    channels: HashMap<String, Channel>,
    retired: HashSet<HandleId>,
}

impl ChannelRegistry {
    /// Creates a new channel registry.
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        buffer_size: usize,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            transport,
            state: Mutex::new(RegistryState::default()),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    /// Acquires a handle on `topic`, opening the underlying channel if this
    /// is the first live handle.
    pub async fn acquire(&self, topic: &str) -> AppResult<ChannelHandle> {
        validate_topic(topic)?;
        let mut state = self.state.lock().await;
        let id = HandleId::new();

        if let Some(channel) = state.channels.get_mut(topic) {
            let receiver = channel.attach(id);
            debug!(
                topic = %topic,
                handle = %id,
                refs = channel.ref_count(),
                "Reusing open channel"
            );
            return Ok(ChannelHandle::new(id, topic.to_string(), receiver));
        }

        let upstream = self.transport.open(topic).await.map_err(|e| {
            AppError::with_source(
                bidhub_core::error::ErrorKind::Channel,
                format!("Failed to open channel '{topic}': {}", e.message),
                e,
            )
        })?;

        let mut channel = Channel::open(topic.to_string(), upstream, self.buffer_size);
        let receiver = channel.attach(id);
        state.channels.insert(topic.to_string(), channel);
        self.metrics.channel_opened();

        info!(topic = %topic, handle = %id, "Channel opened");
        Ok(ChannelHandle::new(id, topic.to_string(), receiver))
    }

    /// Releases a handle. The last release of a topic closes the underlying
    /// channel.
    ///
    /// Releasing a handle that is not live (already released, or issued by
    /// another registry) fails with `ErrorKind::DoubleRelease` and leaves
    /// every count untouched.
    pub async fn release(&self, handle: &ChannelHandle) -> AppResult<()> {
        let mut state = self.state.lock().await;

        if state.retired.remove(&handle.id()) {
            debug!(topic = %handle.topic(), handle = %handle.id(), "Released retired handle");
            return Ok(());
        }

        let detached = match state.channels.get_mut(handle.topic()) {
            Some(channel) => channel.detach(handle.id()),
            None => false,
        };

        if !detached {
            error!(
                topic = %handle.topic(),
                handle = %handle.id(),
                "Channel handle released more times than acquired"
            );
            return Err(AppError::double_release(format!(
                "Handle {} on '{}' is not live",
                handle.id(),
                handle.topic()
            )));
        }

        let empty = state
            .channels
            .get(handle.topic())
            .is_some_and(|channel| channel.is_empty());

        if empty {
            if let Some(channel) = state.channels.remove(handle.topic()) {
                channel.shutdown();
            }
            self.metrics.channel_closed();
            self.transport.close(handle.topic()).await.map_err(|e| {
                AppError::with_source(
                    bidhub_core::error::ErrorKind::Channel,
                    format!("Failed to close channel '{}': {}", handle.topic(), e.message),
                    e,
                )
            })?;
            info!(topic = %handle.topic(), "Channel closed");
        }

        Ok(())
    }

    /// Broadcasts an event on a topic.
    pub async fn publish(&self, topic: &str, event: ChannelEvent) -> AppResult<()> {
        validate_topic(topic)?;
        self.transport
            .publish(topic, event)
            .await
            .map_err(|e| AppError::channel(format!("Publish on '{topic}' failed: {}", e.message)))
    }

    /// Tracks a presence record on a topic.
    pub async fn track(&self, topic: &str, presence: UserPresence) -> AppResult<()> {
        validate_topic(topic)?;
        self.transport
            .track(topic, presence)
            .await
            .map_err(|e| AppError::channel(format!("Track on '{topic}' failed: {}", e.message)))
    }

    /// Stops tracking a user on a topic.
    pub async fn untrack(&self, topic: &str, user_id: UserId) -> AppResult<()> {
        validate_topic(topic)?;
        self.transport
            .untrack(topic, user_id)
            .await
            .map_err(|e| AppError::channel(format!("Untrack on '{topic}' failed: {}", e.message)))
    }

    /// Closes every channel this registry owns.
    ///
    /// Outstanding handles stop receiving events; releasing one of them
    /// afterwards succeeds once.
    pub async fn disconnect(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let channels: Vec<Channel> = state.channels.drain().map(|(_, c)| c).collect();
        let mut first_error = None;

        for channel in channels {
            let topic = channel.topic.clone();
            let orphaned = channel.shutdown();
            state.retired.extend(orphaned);
            self.metrics.channel_closed();

            if let Err(e) = self.transport.close(&topic).await {
                warn!(topic = %topic, error = %e, "Failed to close channel on disconnect");
                first_error.get_or_insert(AppError::channel(format!(
                    "Failed to close channel '{topic}': {}",
                    e.message
                )));
            }
        }

        info!("Channel registry disconnected");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns the number of live handles on a topic.
    pub async fn ref_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .channels
            .get(topic)
            .map(|c| c.ref_count())
            .unwrap_or(0)
    }

    /// Returns the number of open channels.
    pub async fn channel_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    /// Engine metrics shared with every subscription on this registry.
    pub fn metrics(&self) -> &Arc<RealtimeMetrics> {
        &self.metrics
    }

    /// Returns whether a topic is currently open.
    pub async fn is_open(&self, topic: &str) -> bool {
        self.state.lock().await.channels.contains_key(topic)
    }
}
