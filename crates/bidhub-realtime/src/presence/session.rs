//! Site-wide presence session for one signed-in user.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use bidhub_core::result::AppResult;
use bidhub_entity::presence::{Participant, PresenceStatus, UserPresence};

use crate::channel::subscription::{Disposer, EventFn, Subscription, spawn_dispatcher};
use crate::channel::types::ChannelType;
use crate::message::types::ChannelEvent;

use super::heartbeat::{TrackedPresence, spawn_heartbeat};
use super::roster::PresenceRoster;
use super::tracker::PresenceTracker;

/// A user's presence on `global_presence`.
///
/// Re-tracks every heartbeat and mirrors who else is online. Call
/// [`end`](Self::end) when the user signs out.
#[derive(Debug)]
pub struct PresenceSession {
    participant: Participant,
    tracker: PresenceTracker,
    tracked: TrackedPresence,
    roster: Arc<Mutex<PresenceRoster>>,
    subscription: Subscription,
    ended: AtomicBool,
}

impl PresenceSession {
    pub(crate) async fn start(tracker: PresenceTracker, participant: Participant) -> AppResult<Self> {
        let topic = ChannelType::GlobalPresence.to_topic();
        let registry = tracker.registry().clone();
        let handle = registry.acquire(&topic).await?;

        let record = UserPresence::joining(&participant, PresenceStatus::Online, None);
        if let Err(e) = registry.track(&topic, record.clone()).await {
            if let Err(release_err) = registry.release(&handle).await {
                warn!(error = %release_err, "Failed to release presence handle");
            }
            return Err(e);
        }

        let disposer = Disposer::new();
        let subscription = Subscription::new(topic.clone(), disposer.clone());
        let tracked: TrackedPresence = Arc::new(Mutex::new(Some(record)));
        let roster = Arc::new(Mutex::new(PresenceRoster::new()));

        let on_event = {
            let roster = roster.clone();
            let tracker = tracker.clone();
            move |event: ChannelEvent| {
                let mut roster = roster.lock();
                match event {
                    ChannelEvent::PresenceSync { participants } => {
                        roster.apply_sync(participants, tracker.stale_cutoff(Utc::now()));
                    }
                    ChannelEvent::PresenceJoin { presence } => {
                        roster.apply_join(presence);
                    }
                    ChannelEvent::PresenceLeave { user_id } => {
                        roster.apply_leave(user_id);
                    }
                    _ => {}
                }
            }
        };
        subscription.push_task(spawn_dispatcher(
            registry.clone(),
            handle,
            disposer.clone(),
            EventFn(on_event),
        ));

        let prune = {
            let roster = roster.clone();
            let tracker = tracker.clone();
            move || {
                roster.lock().prune_stale(tracker.stale_cutoff(Utc::now()));
            }
        };
        subscription.push_task(spawn_heartbeat(
            registry,
            topic,
            tracked.clone(),
            disposer,
            tracker.heartbeat_interval(),
            prune,
        ));

        info!(user_id = %participant.user_id, "Presence session started");
        Ok(Self {
            participant,
            tracker,
            tracked,
            roster,
            subscription,
            ended: AtomicBool::new(false),
        })
    }

    /// The signed-in participant.
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// This user's current record, `None` once ended.
    pub fn presence(&self) -> Option<UserPresence> {
        self.tracked.lock().clone()
    }

    /// Everyone currently online, earliest first.
    pub fn online(&self) -> Vec<UserPresence> {
        self.roster.lock().participants()
    }

    /// Change this user's status and re-track immediately.
    pub async fn set_status(&self, status: PresenceStatus) -> AppResult<()> {
        let Some(current) = self.presence() else {
            return Ok(());
        };
        let updated = self
            .tracker
            .update_status(self.subscription.topic(), &current, status)
            .await?;
        if let Some(slot) = self.tracked.lock().as_mut() {
            *slot = updated;
        }
        Ok(())
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Untrack the user and release the global presence channel.
    ///
    /// Idempotent.
    pub async fn end(&self) -> AppResult<()> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tracked.lock().take();
        self.subscription.close().await;

        let result = self
            .tracker
            .registry()
            .untrack(self.subscription.topic(), self.participant.user_id)
            .await;
        info!(user_id = %self.participant.user_id, "Presence session ended");
        result
    }
}
