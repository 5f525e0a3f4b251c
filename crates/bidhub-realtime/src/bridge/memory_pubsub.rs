//! In-memory pub/sub for tests and single-node deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::UserId;
use bidhub_entity::presence::UserPresence;

use crate::message::types::ChannelEvent;
use crate::traits::transport::{EventStream, RealtimeTransport};

/// Open/close counters, for asserting on subscription traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportStats {
    /// Calls to `open`.
    pub opens: u64,
    /// Calls to `close`.
    pub closes: u64,
    /// Events published (including presence events).
    pub published: u64,
}

#[derive(Debug)]
struct Topic {
    sender: broadcast::Sender<ChannelEvent>,
    presence: HashMap<UserId, UserPresence>,
}

impl Topic {
    fn snapshot(&self) -> ChannelEvent {
        let mut participants: Vec<UserPresence> = self.presence.values().cloned().collect();
        participants.sort_by_key(|p| p.joined_at);
        ChannelEvent::PresenceSync { participants }
    }
}

/// In-memory transport shared by every client of one process.
///
/// Several registries may sit on the same transport; each then sees the
/// others' publishes, the way separate browsers share one realtime server.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Topic name → broadcast sender and presence set
    topics: Mutex<HashMap<String, Topic>>,
    /// Buffer size for topics
    buffer_size: usize,
    opens: AtomicU64,
    closes: AtomicU64,
    published: AtomicU64,
    fail_opens: AtomicBool,
    fail_publishes: AtomicBool,
}

impl MemoryTransport {
    /// Create a new in-memory transport
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            published: AtomicU64::new(0),
            fail_opens: AtomicBool::new(false),
            fail_publishes: AtomicBool::new(false),
        }
    }

    /// Current counters
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            opens: self.opens.load(Ordering::SeqCst),
            closes: self.closes.load(Ordering::SeqCst),
            published: self.published.load(Ordering::SeqCst),
        }
    }

    /// Make subsequent `open` calls fail
    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `publish` and `track` calls fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Presence records currently tracked on a topic
    pub fn tracked(&self, topic: &str) -> Vec<UserPresence> {
        self.topics
            .lock()
            .get(topic)
            .map(|t| t.presence.values().cloned().collect())
            .unwrap_or_default()
    }

    fn send(&self, topic: &Topic, event: ChannelEvent) {
        self.published.fetch_add(1, Ordering::SeqCst);
        // Nobody listening is not an error.
        let _ = topic.sender.send(event);
    }

    fn check_publish(&self, topic: &str) -> AppResult<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(AppError::channel(format!("Transport refused publish on '{topic}'")));
        }
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn open(&self, topic: &str) -> AppResult<EventStream> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(AppError::channel(format!("Transport refused to open '{topic}'")));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            sender: broadcast::channel(self.buffer_size).0,
            presence: HashMap::new(),
        });
        let receiver = entry.sender.subscribe();
        if !entry.presence.is_empty() {
            let sync = entry.snapshot();
            self.send(entry, sync);
        }
        tracing::debug!(topic = %topic, "Memory transport opened topic");
        Ok(receiver)
    }

    async fn close(&self, topic: &str) -> AppResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(topic = %topic, "Memory transport closed topic");
        Ok(())
    }

    async fn publish(&self, topic: &str, event: ChannelEvent) -> AppResult<()> {
        self.check_publish(topic)?;
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            sender: broadcast::channel(self.buffer_size).0,
            presence: HashMap::new(),
        });
        self.send(entry, event);
        Ok(())
    }

    async fn track(&self, topic: &str, presence: UserPresence) -> AppResult<()> {
        self.check_publish(topic)?;
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            sender: broadcast::channel(self.buffer_size).0,
            presence: HashMap::new(),
        });
        entry.presence.insert(presence.user_id, presence.clone());
        self.send(entry, ChannelEvent::PresenceJoin { presence });
        let sync = entry.snapshot();
        self.send(entry, sync);
        Ok(())
    }

    async fn untrack(&self, topic: &str, user_id: UserId) -> AppResult<()> {
        self.check_publish(topic)?;
        let mut topics = self.topics.lock();
        let Some(entry) = topics.get_mut(topic) else {
            return Ok(());
        };
        if entry.presence.remove(&user_id).is_none() {
            return Ok(());
        }
        self.send(entry, ChannelEvent::PresenceLeave { user_id });
        let sync = entry.snapshot();
        self.send(entry, sync);
        Ok(())
    }
}
