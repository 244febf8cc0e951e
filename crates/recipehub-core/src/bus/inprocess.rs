//! In-process pub/sub transport.
//!
//! Each subscriber owns a bounded queue; publish walks an immutable snapshot
//! of subscriber senders and never waits on any of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Event, EventBus, SlotGuard, Subscription};
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct SubscriberEntry {
    id: u64,
    sender: mpsc::Sender<Event>,
}

#[derive(Debug, Default)]
struct TopicState {
    // Mutated only on subscribe/unsubscribe.
    registry: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    // Read by publish without touching the registry lock.
    snapshot: RwLock<Arc<Vec<SubscriberEntry>>>,
}

impl TopicState {
    fn register(&self, id: u64, sender: mpsc::Sender<Event>) {
        let mut registry = self.registry.lock();
        registry.insert(id, sender);
        self.rebuild_snapshot(&registry);
    }

    fn remove(&self, id: u64) {
        let mut registry = self.registry.lock();
        if registry.remove(&id).is_some() {
            self.rebuild_snapshot(&registry);
        }
    }

    fn clear(&self) -> usize {
        let mut registry = self.registry.lock();
        let dropped = registry.len();
        registry.clear();
        self.rebuild_snapshot(&registry);
        dropped
    }

    fn rebuild_snapshot(&self, registry: &HashMap<u64, mpsc::Sender<Event>>) {
        let mut entries: Vec<SubscriberEntry> = registry
            .iter()
            .map(|(id, sender)| SubscriberEntry {
                id: *id,
                sender: sender.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        *self.snapshot.write() = Arc::new(entries);
    }

    fn current(&self) -> Arc<Vec<SubscriberEntry>> {
        Arc::clone(&self.snapshot.read())
    }

    fn len(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Unregisters a subscriber from its topic when dropped.
struct InProcessSlot {
    topic: Weak<TopicState>,
    id: u64,
}

impl SlotGuard for InProcessSlot {}

impl Drop for InProcessSlot {
    fn drop(&mut self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.remove(self.id);
        }
    }
}

/// In-process [`EventBus`].
///
/// The connection can be dropped with [`disconnect`](InProcessBus::disconnect),
/// which ends every live subscription, and restored with
/// [`reconnect`](InProcessBus::reconnect). Reconnecting never revives old
/// subscriptions.
///
/// ```
/// use recipehub_core::bus::{EventBus, InProcessBus};
/// use serde_json::json;
///
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let bus = InProcessBus::new(16);
///     let mut sub = bus.subscribe("updates").await.expect("subscribe");
///     bus.publish("updates", json!({"n": 1})).await.expect("publish");
///     let event = sub.recv().await.expect("event");
///     assert_eq!(event.payload, json!({"n": 1}));
/// });
/// ```
#[derive(Debug)]
pub struct InProcessBus {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    connected: AtomicBool,
    // Held across connect-state changes and subscriber registration, so no
    // subscriber can be registered after a disconnect has cleared the topics.
    lifecycle: Mutex<()>,
    next_id: AtomicU64,
    subscriber_queue_capacity: usize,
}

impl InProcessBus {
    pub fn new(subscriber_queue_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            lifecycle: Mutex::new(()),
            next_id: AtomicU64::new(0),
            subscriber_queue_capacity: subscriber_queue_capacity.max(1),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Simulates (or reacts to) loss of the transport connection: every
    /// live subscription observes end-of-stream and further publishes fail.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.end_subscriptions();
    }

    pub fn reconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("event bus reconnected");
    }

    /// Shuts the transport down. All subscriptions end.
    pub fn close(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.end_subscriptions();
        self.topics.write().clear();
    }

    fn end_subscriptions(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let topics = self.topics.read();
        let mut ended = 0;
        for state in topics.values() {
            ended += state.clear();
        }
        tracing::warn!(subscriptions = ended, "event bus disconnected");
    }

    fn register_subscriber(&self, topic: &str) -> CoreResult<Subscription> {
        let _lifecycle = self.lifecycle.lock();
        self.ensure_connected()?;
        let state = self.topic_state(topic);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.subscriber_queue_capacity);
        state.register(id, tx);
        let guard = InProcessSlot {
            topic: Arc::downgrade(&state),
            id,
        };
        Ok(Subscription::new(topic, rx, Box::new(guard)))
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map(|t| t.len()).unwrap_or(0)
    }

    fn topic_state(&self, topic: &str) -> Arc<TopicState> {
        if let Some(state) = self.topics.read().get(topic) {
            return Arc::clone(state);
        }
        let mut topics = self.topics.write();
        Arc::clone(topics.entry(topic.to_string()).or_default())
    }

    fn ensure_connected(&self) -> CoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CoreError::TransportUnavailable(
                "event bus is disconnected".to_string(),
            ))
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_QUEUE_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Value) -> CoreResult<usize> {
        self.ensure_connected()?;
        let state = match self.topics.read().get(topic) {
            Some(state) => Arc::clone(state),
            None => return Ok(0),
        };
        let event = Event::new(topic, payload);
        let mut delivered = 0;
        for entry in state.current().iter() {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(topic, subscriber = entry.id, "subscriber queue full; event dropped");
                }
                // Receiver already cancelled; its slot is being released.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, topic: &str) -> CoreResult<Subscription> {
        self.register_subscriber(topic)
    }

    fn close(&self) {
        InProcessBus::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = InProcessBus::new(4);
        let delivered = bus.publish("t", json!(1)).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_independent_subscribers() {
        let bus = InProcessBus::new(8);
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();
        assert_eq!(bus.publish("t", json!("x")).await.unwrap(), 2);
        assert_eq!(a.recv().await.unwrap().payload, json!("x"));
        assert_eq!(b.recv().await.unwrap().payload, json!("x"));
    }

    #[tokio::test]
    async fn test_no_retroactive_delivery() {
        let bus = InProcessBus::new(8);
        bus.publish("t", json!("before")).await.unwrap();
        let mut sub = bus.subscribe("t").await.unwrap();
        bus.publish("t", json!("after")).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().payload, json!("after"));
        assert!(sub.try_next_now().is_none());
    }

    #[tokio::test]
    async fn test_order_preserved_per_topic() {
        let bus = InProcessBus::new(64);
        let mut sub = bus.subscribe("t").await.unwrap();
        for i in 0..20 {
            bus.publish("t", json!(i)).await.unwrap();
        }
        for i in 0..20 {
            assert_eq!(sub.recv().await.unwrap().payload, json!(i));
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InProcessBus::new(8);
        let mut other = bus.subscribe("other").await.unwrap();
        bus.publish("t", json!(1)).await.unwrap();
        assert!(other.try_next_now().is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_slot_and_discards_in_flight() {
        let bus = InProcessBus::new(8);
        let mut sub = bus.subscribe("t").await.unwrap();
        bus.publish("t", json!("queued")).await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);
        sub.cancel();
        assert_eq!(bus.subscriber_count("t"), 0);
        assert!(sub.recv().await.is_none());
        assert_eq!(bus.publish("t", json!("later")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_slot() {
        let bus = InProcessBus::new(8);
        let sub = bus.subscribe("t").await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_siblings() {
        let bus = InProcessBus::new(2);
        let _stalled = bus.subscribe("t").await.unwrap();
        let mut live = bus.subscribe("t").await.unwrap();
        for i in 0..5 {
            bus.publish("t", json!(i)).await.unwrap();
            assert_eq!(live.recv().await.unwrap().payload, json!(i));
        }
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams_and_rejects_publish() {
        let bus = InProcessBus::new(8);
        let mut sub = bus.subscribe("t").await.unwrap();
        bus.disconnect();
        let ended = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
        assert_eq!(ended.unwrap(), None);
        assert!(matches!(
            bus.publish("t", json!(1)).await,
            Err(CoreError::TransportUnavailable(_))
        ));
        assert!(bus.subscribe("t").await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_requires_new_subscribe() {
        let bus = InProcessBus::new(8);
        let mut old = bus.subscribe("t").await.unwrap();
        bus.disconnect();
        bus.reconnect();
        let mut fresh = bus.subscribe("t").await.unwrap();
        bus.publish("t", json!("hello")).await.unwrap();
        assert_eq!(fresh.recv().await.unwrap().payload, json!("hello"));
        assert!(old.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_guard_does_not_remove_new_subscriber() {
        let bus = InProcessBus::new(8);
        let old = bus.subscribe("t").await.unwrap();
        bus.disconnect();
        bus.reconnect();
        let _fresh = bus.subscribe("t").await.unwrap();
        drop(old);
        assert_eq!(bus.subscriber_count("t"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_racing_disconnect_always_ends() {
        for _ in 0..50 {
            let bus = Arc::new(InProcessBus::new(8));
            let subscribers: Vec<_> = (0..8)
                .map(|_| {
                    let bus = bus.clone();
                    tokio::spawn(async move { bus.subscribe("t").await })
                })
                .collect();
            bus.disconnect();

            for handle in subscribers {
                if let Ok(mut sub) = handle.await.unwrap() {
                    let ended = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
                    assert_eq!(ended.expect("subscription outlived disconnect"), None);
                }
            }
            assert_eq!(bus.subscriber_count("t"), 0);
        }
    }

    impl Subscription {
        fn try_next_now(&mut self) -> Option<Event> {
            self.receiver.as_mut().and_then(|r| r.try_recv().ok())
        }
    }
}
