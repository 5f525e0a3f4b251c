//! Subscription lifecycle: delivery gating, disposal, and the per-handle
//! dispatcher task.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bidhub_core::result::AppResult;

use crate::message::types::ChannelEvent;

use super::channel::Inbound;
use super::handle::ChannelHandle;
use super::registry::ChannelRegistry;

thread_local! {
    /// Gated callbacks currently running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

struct Delivering;

impl Delivering {
    fn enter() -> Self {
        DELIVERING.with(|depth| depth.set(depth.get() + 1));
        Self
    }

    fn active() -> bool {
        DELIVERING.with(|depth| depth.get() > 0)
    }
}

impl Drop for Delivering {
    fn drop(&mut self) {
        DELIVERING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Guards callback delivery for one subscription.
///
/// Callbacks run while the gate's lock is held. Closed from outside any
/// callback, [`close`](Self::close) waits for that lock, so once it returns
/// no callback is running and none will start.
///
/// Closed from inside a callback (of this gate or any other), `close` only
/// flips the flag and returns: no new callback starts, but one already
/// running on another thread may still finish. Two subscriptions disposing
/// each other from their own callbacks therefore cannot deadlock.
#[derive(Debug)]
pub struct DeliveryGate {
    open: AtomicBool,
    running: ReentrantMutex<()>,
}

impl DeliveryGate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            running: ReentrantMutex::new(()),
        }
    }

    /// Runs `f` if the gate is still open. Returns whether it ran.
    pub fn deliver<F: FnOnce()>(&self, f: F) -> bool {
        let _running = self.running.lock();
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        let _delivering = Delivering::enter();
        f();
        true
    }

    /// Closes the gate.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if !Delivering::active() {
            drop(self.running.lock());
        }
    }

    /// Returns whether callbacks are still delivered.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Synchronous teardown trigger for a subscription.
///
/// Cheap to clone and safe to call from inside a callback.
#[derive(Debug, Clone)]
pub struct Disposer {
    gate: Arc<DeliveryGate>,
    cancel: CancellationToken,
}

impl Disposer {
    /// Creates a live disposer.
    pub fn new() -> Self {
        Self {
            gate: Arc::new(DeliveryGate::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Silences every callback and stops the subscription's tasks.
    ///
    /// Idempotent. After this returns no callback of the subscription runs.
    pub fn dispose(&self) {
        self.gate.close();
        self.cancel.cancel();
    }

    /// Returns whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The delivery gate shared by the subscription's tasks.
    pub fn gate(&self) -> &DeliveryGate {
        &self.gate
    }

    /// Token cancelled on disposal.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for Disposer {
    fn default() -> Self {
        Self::new()
    }
}

/// A live attachment to one topic.
///
/// Dropping a subscription disposes it; the handle is then released in
/// the background. [`close`](Self::close) does the same and waits for the
/// release to finish.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    disposer: Disposer,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(topic: impl Into<String>, disposer: Disposer) -> Self {
        Self {
            topic: topic.into(),
            disposer,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push_task(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    /// Topic this subscription is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A clone of the teardown trigger.
    pub fn disposer(&self) -> Disposer {
        self.disposer.clone()
    }

    /// Returns whether callbacks are still being delivered.
    pub fn is_active(&self) -> bool {
        !self.disposer.is_disposed()
    }

    /// Synchronously silences the subscription.
    pub fn unsubscribe(&self) {
        self.disposer.dispose();
    }

    /// Disposes and waits until every task has exited and the channel
    /// handle has been released.
    pub async fn close(&self) {
        self.disposer.dispose();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(topic = %self.topic, error = %e, "Subscription task failed");
            }
        }
        debug!(topic = %self.topic, "Subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disposer.dispose();
    }
}

/// Consumer fed by a dispatcher task.
///
/// `on_event` and `on_resync` run behind the subscription's delivery gate.
#[async_trait]
pub(crate) trait EventHandler: Send + 'static {
    /// State reloaded after the handle fell behind.
    type Snapshot: Send;

    /// Apply one event.
    fn on_event(&mut self, event: ChannelEvent);

    /// Load what is needed to recover skipped events. `Ok(None)` when the
    /// topic has nothing to recover.
    async fn resync(&mut self) -> AppResult<Option<Self::Snapshot>>;

    /// Apply a reloaded snapshot.
    fn on_resync(&mut self, snapshot: Self::Snapshot);
}

/// Handler for topics whose state heals on its own, such as presence,
/// which is re-synced on every heartbeat.
pub(crate) struct EventFn<F>(pub(crate) F);

#[async_trait]
impl<F> EventHandler for EventFn<F>
where
    F: FnMut(ChannelEvent) + Send + 'static,
{
    type Snapshot = ();

    fn on_event(&mut self, event: ChannelEvent) {
        (self.0)(event);
    }

    async fn resync(&mut self) -> AppResult<Option<()>> {
        Ok(None)
    }

    fn on_resync(&mut self, _snapshot: ()) {}
}

/// Spawns the task that drains `handle` into `handler`.
///
/// On a lag marker the handler's snapshot is reloaded and applied before
/// the events that follow. The task owns the handle and releases it
/// exactly once, when the subscription is disposed or the channel is torn
/// down.
pub(crate) fn spawn_dispatcher<H>(
    registry: Arc<ChannelRegistry>,
    mut handle: ChannelHandle,
    disposer: Disposer,
    mut handler: H,
) -> JoinHandle<()>
where
    H: EventHandler,
{
    let metrics = registry.metrics().clone();
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = disposer.token().cancelled() => break,
                inbound = handle.next_event() => inbound,
            };
            let Some(inbound) = next else {
                debug!(topic = %handle.topic(), "Channel closed under subscription");
                break;
            };

            match inbound {
                Inbound::Event(event) => {
                    if disposer.gate().deliver(|| handler.on_event(event)) {
                        metrics.event_delivered();
                    } else {
                        metrics.event_dropped();
                        break;
                    }
                }
                Inbound::Lagged { skipped } => {
                    let reloaded = tokio::select! {
                        biased;
                        _ = disposer.token().cancelled() => break,
                        reloaded = handler.resync() => reloaded,
                    };
                    match reloaded {
                        Ok(Some(snapshot)) => {
                            if !disposer.gate().deliver(|| handler.on_resync(snapshot)) {
                                break;
                            }
                            metrics.resynced();
                            debug!(topic = %handle.topic(), skipped, "Subscription resynced");
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(
                                topic = %handle.topic(),
                                skipped,
                                error = %e,
                                "Resync failed; skipped events are lost"
                            );
                        }
                    }
                }
            }
        }

        if let Err(e) = registry.release(&handle).await {
            warn!(topic = %handle.topic(), error = %e, "Failed to release channel handle");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use bidhub_core::types::id::UserId;

    use crate::bridge::memory_pubsub::MemoryTransport;
    use crate::metrics::RealtimeMetrics;

    #[test]
    fn test_closed_gate_skips_callbacks() {
        let gate = DeliveryGate::new();
        let mut calls = 0;
        assert!(gate.deliver(|| calls += 1));
        gate.close();
        assert!(!gate.deliver(|| calls += 1));
        assert_eq!(calls, 1);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_dispose_from_inside_callback() {
        let disposer = Disposer::new();
        let inner = disposer.clone();
        assert!(disposer.gate().deliver(|| inner.dispose()));
        assert!(disposer.is_disposed());
        assert!(!disposer.gate().deliver(|| panic!("must not run")));

        // Second dispose is a no-op.
        disposer.dispose();
    }

    #[test]
    fn test_close_waits_for_callback_on_other_thread() {
        let gate = Arc::new(DeliveryGate::new());
        let started = Arc::new(Barrier::new(2));
        let finished = Arc::new(AtomicBool::new(false));

        let worker = {
            let gate = gate.clone();
            let started = started.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                gate.deliver(|| {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                })
            })
        };

        started.wait();
        gate.close();
        assert!(finished.load(Ordering::SeqCst));
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_gates_closing_each_other_from_callbacks() {
        let first = Arc::new(DeliveryGate::new());
        let second = Arc::new(DeliveryGate::new());
        let both_inside = Arc::new(Barrier::new(2));

        let spawn_closer = |own: Arc<DeliveryGate>, other: Arc<DeliveryGate>| {
            let both_inside = both_inside.clone();
            thread::spawn(move || {
                own.deliver(|| {
                    both_inside.wait();
                    other.close();
                })
            })
        };
        let a = spawn_closer(first.clone(), second.clone());
        let b = spawn_closer(second.clone(), first.clone());

        assert!(a.join().unwrap());
        assert!(b.join().unwrap());
        assert!(!first.is_open());
        assert!(!second.is_open());
        assert!(!first.deliver(|| panic!("must not run")));
    }

    #[tokio::test]
    async fn test_dispatcher_releases_handle_on_close() {
        let transport = Arc::new(MemoryTransport::new(16));
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(ChannelRegistry::new(transport.clone(), 16, metrics.clone()));

        let handle = registry.acquire("auction:9").await.unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let disposer = Disposer::new();
        let subscription = Subscription::new("auction:9", disposer.clone());
        subscription.push_task(spawn_dispatcher(
            registry.clone(),
            handle,
            disposer,
            EventFn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        registry
            .publish(
                "auction:9",
                ChannelEvent::PresenceLeave {
                    user_id: UserId::new(),
                },
            )
            .await
            .unwrap();
        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        subscription.close().await;
        assert!(!subscription.is_active());
        assert_eq!(registry.ref_count("auction:9").await, 0);
        assert_eq!(transport.stats().closes, 1);

        registry
            .publish(
                "auction:9",
                ChannelEvent::PresenceLeave {
                    user_id: UserId::new(),
                },
            )
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
