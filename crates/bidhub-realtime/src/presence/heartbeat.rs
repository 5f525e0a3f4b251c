//! Periodic presence re-track.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use bidhub_entity::presence::UserPresence;

use crate::channel::registry::ChannelRegistry;
use crate::channel::subscription::Disposer;

/// Record re-tracked on every beat. `None` while the user is not joined.
pub type TrackedPresence = Arc<Mutex<Option<UserPresence>>>;

/// Spawn the heartbeat loop for one topic.
///
/// Every `period` the tracked record (if any) is re-tracked with a fresh
/// `last_seen`, then `on_tick` runs behind the subscription's delivery
/// gate. The loop ends when `disposer` is disposed.
pub(crate) fn spawn_heartbeat<F>(
    registry: Arc<ChannelRegistry>,
    topic: String,
    tracked: TrackedPresence,
    disposer: Disposer,
    period: Duration,
    mut on_tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = disposer.token().cancelled() => break,
                _ = interval.tick() => {}
            }

            let record = tracked.lock().as_mut().map(|presence| {
                presence.last_seen = Utc::now();
                presence.clone()
            });
            if let Some(record) = record {
                if let Err(e) = registry.track(&topic, record).await {
                    tracing::warn!(topic = %topic, error = %e, "Presence heartbeat failed");
                }
            }

            disposer.gate().deliver(&mut on_tick);
        }

        tracing::debug!(topic = %topic, "Heartbeat loop ended");
    })
}
