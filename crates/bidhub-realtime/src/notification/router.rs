//! Per-user notification channels.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use bidhub_core::config::NotificationRealtimeConfig;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{NotificationId, UserId};
use bidhub_entity::notification::LiveNotification;

use crate::channel::registry::ChannelRegistry;
use crate::channel::subscription::{Disposer, EventHandler, Subscription, spawn_dispatcher};
use crate::channel::types::ChannelType;
use crate::message::types::ChannelEvent;
use crate::traits::store::AuctionStore;

use super::feed::NotificationFeed;
use super::sink::NotificationSink;

/// Opens `notifications:{user_id}` feeds and creates notifications.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    registry: Arc<ChannelRegistry>,
    store: Arc<dyn AuctionStore>,
    config: NotificationRealtimeConfig,
}

impl NotificationRouter {
    /// Create a router.
    pub fn new(
        registry: Arc<ChannelRegistry>,
        store: Arc<dyn AuctionStore>,
        config: NotificationRealtimeConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Subscribe to a user's feed.
    ///
    /// The feed is seeded with the user's most recent stored notifications
    /// (without invoking the sink) before live delivery starts.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        sink: Arc<dyn NotificationSink>,
    ) -> AppResult<NotificationSubscription> {
        let topic = ChannelType::Notifications(user_id).to_topic();
        let handle = self.registry.acquire(&topic).await?;

        let stored = match self
            .store
            .list_notifications(user_id, self.config.initial_fetch_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(release_err) = self.registry.release(&handle).await {
                    warn!(topic = %topic, error = %release_err, "Failed to release feed handle");
                }
                return Err(e);
            }
        };

        let mut feed = NotificationFeed::new(self.config.max_stored_per_user);
        feed.seed(stored);
        debug!(user_id = %user_id, seeded = feed.len(), "Seeded notification feed");
        let feed = Arc::new(Mutex::new(feed));

        let disposer = Disposer::new();
        let subscription = Subscription::new(topic, disposer.clone());
        let handler = FeedEvents {
            user_id,
            feed: feed.clone(),
            sink,
            store: self.store.clone(),
            fetch_limit: self.config.initial_fetch_limit,
        };
        subscription.push_task(spawn_dispatcher(
            self.registry.clone(),
            handle,
            disposer,
            handler,
        ));

        info!(user_id = %user_id, "Subscribed to notifications");
        Ok(NotificationSubscription {
            user_id,
            feed,
            subscription,
        })
    }

    /// Create a notification. Subscribers receive it through the store's
    /// change feed.
    pub async fn notify(&self, notification: LiveNotification) -> AppResult<()> {
        let user_id = notification.user_id;
        let kind = notification.kind;
        self.store.insert_notification(notification).await?;
        debug!(user_id = %user_id, kind = %kind, "Notification created");
        Ok(())
    }
}

/// Applies `notifications:{user_id}` events to one feed.
struct FeedEvents {
    user_id: UserId,
    feed: Arc<Mutex<NotificationFeed>>,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn AuctionStore>,
    fetch_limit: usize,
}

impl FeedEvents {
    fn announce(&self, added: &[LiveNotification], unread: usize) {
        if added.is_empty() {
            return;
        }
        for notification in added {
            self.sink.on_notification(notification);
        }
        self.sink.on_unread_count(unread);
    }
}

#[async_trait]
impl EventHandler for FeedEvents {
    type Snapshot = Vec<LiveNotification>;

    fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::NotificationInserted { notification }
                if notification.user_id == self.user_id =>
            {
                let unread = {
                    let mut feed = self.feed.lock();
                    feed.receive(notification.clone())
                        .then(|| feed.unread_count())
                };
                if let Some(unread) = unread {
                    self.announce(std::slice::from_ref(&notification), unread);
                }
            }
            other => {
                debug!(user_id = %self.user_id, event = other.name(), "Ignoring event on notification channel");
            }
        }
    }

    async fn resync(&mut self) -> AppResult<Option<Vec<LiveNotification>>> {
        self.store
            .list_notifications(self.user_id, self.fetch_limit)
            .await
            .map(Some)
    }

    fn on_resync(&mut self, stored: Vec<LiveNotification>) {
        let (added, unread) = {
            let mut feed = self.feed.lock();
            let added = feed.catch_up(stored);
            (added, feed.unread_count())
        };
        debug!(user_id = %self.user_id, recovered = added.len(), "Notification feed caught up");
        self.announce(&added, unread);
    }
}

/// A live attachment to one user's notification feed.
#[derive(Debug)]
pub struct NotificationSubscription {
    user_id: UserId,
    feed: Arc<Mutex<NotificationFeed>>,
    subscription: Subscription,
}

impl NotificationSubscription {
    /// The feed's owner.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> Vec<LiveNotification> {
        self.feed.lock().items()
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.feed.lock().unread_count()
    }

    /// Mark one notification read. Idempotent.
    pub fn mark_as_read(&self, id: NotificationId) -> bool {
        self.feed.lock().mark_as_read(id)
    }

    /// Mark every notification read. Idempotent.
    pub fn mark_all_as_read(&self) -> usize {
        self.feed.lock().mark_all_as_read()
    }

    /// A clone of the teardown trigger.
    pub fn disposer(&self) -> Disposer {
        self.subscription.disposer()
    }

    /// Whether callbacks are still delivered.
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Synchronously silence the sink.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Silence the sink and wait for the channel handle to be released.
    pub async fn close(&self) {
        self.subscription.close().await;
    }
}
