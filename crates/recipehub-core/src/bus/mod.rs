//! Publish/subscribe transport abstraction.
//!
//! The [`EventBus`] trait is the seam between the notification workflow
//! and whatever carries events between processes. Delivery is at-most-once
//! and best-effort ordered: a subscriber sees only events published after
//! its `subscribe` call returned, in the publisher's emission order for a
//! given topic, and nothing is replayed.
//!
//! A [`Subscription`] is owned by exactly one consumer. Dropping it or
//! calling [`Subscription::cancel`] releases the transport slot at once;
//! nothing is yielded afterwards, even if it was already in flight.

pub mod inprocess;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::CoreResult;

pub use inprocess::InProcessBus;

/// A single published message.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Process-wide pub/sub transport handle.
///
/// Implementations are shared behind an `Arc` and must never let one slow
/// subscriber stall the publisher or its siblings.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Hands `payload` to the transport. Returns the number of subscriber
    /// queues that accepted it; no delivery acknowledgement is implied.
    async fn publish(&self, topic: &str, payload: Value) -> CoreResult<usize>;

    /// Opens a new, independent subscription on `topic`.
    async fn subscribe(&self, topic: &str) -> CoreResult<Subscription>;

    /// Releases the transport at shutdown. Live subscriptions end.
    fn close(&self) {}
}

/// Marker for transport resources that are released when dropped.
pub trait SlotGuard: Send + Sync {}

/// Live, cancelable sequence of events for one consumer.
pub struct Subscription {
    topic: String,
    receiver: Option<mpsc::Receiver<Event>>,
    guard: Option<Box<dyn SlotGuard>>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        receiver: mpsc::Receiver<Event>,
        guard: Box<dyn SlotGuard>,
    ) -> Self {
        Self {
            topic: topic.into(),
            receiver: Some(receiver),
            guard: Some(guard),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next event. `None` means the stream ended, either
    /// because the subscription was cancelled or the transport dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => None,
        }
    }

    /// Releases the transport slot and discards anything still queued.
    pub fn cancel(&mut self) {
        // Unregister first so no new event can be queued behind the close.
        self.guard.take();
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_none()
    }

    /// Converts the subscription into a [`Stream`]; dropping the stream
    /// cancels the subscription.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
