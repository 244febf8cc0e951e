//! Comment creation with best-effort fan-out.
//!
//! The workflow is strictly ordered: persist, then enqueue a publish, then
//! return the persisted comment. The publish runs on a background
//! dispatcher task so the caller never waits on the transport, and events
//! leave in the order their comments were persisted. A failed publish is a
//! missed notification, not a failed write: it is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::error::{with_timeout, CoreError, CoreResult};
use crate::filter::{comment_added_payload, COMMENT_ADDED_TOPIC};
use crate::models::{Comment, MAX_COMMENT_CHARS};
use crate::store::PrimaryStore;

pub const DEFAULT_NOTIFY_QUEUE_CAPACITY: usize = 1024;

/// Publishes a comment-added event directly on `bus`.
pub async fn publish_comment_added(bus: &dyn EventBus, comment: &Comment) -> CoreResult<usize> {
    bus.publish(COMMENT_ADDED_TOPIC, comment_added_payload(comment))
        .await
}

/// Background task that drains queued notifications onto the bus.
pub struct NotificationDispatcher {
    sender: Mutex<Option<mpsc::Sender<Comment>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(bus: Arc<dyn EventBus>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_dispatcher(bus, rx));
        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a notification without waiting. Returns `false` when it was
    /// dropped (queue full or dispatcher shut down).
    pub fn enqueue(&self, comment: Comment) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(comment_id = %comment.id, "notification dispatcher closed; event dropped");
            return false;
        };
        match sender.try_send(comment) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(comment)) => {
                tracing::warn!(comment_id = %comment.id, "notification queue full; event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(comment)) => {
                tracing::warn!(comment_id = %comment.id, "notification worker gone; event dropped");
                false
            }
        }
    }

    /// Stops accepting notifications and waits for queued ones to drain.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "notification worker ended abnormally");
            }
        }
    }
}

async fn run_dispatcher(bus: Arc<dyn EventBus>, mut rx: mpsc::Receiver<Comment>) {
    while let Some(comment) = rx.recv().await {
        match publish_comment_added(bus.as_ref(), &comment).await {
            Ok(delivered) => {
                tracing::debug!(comment_id = %comment.id, delivered, "published comment-added event");
            }
            Err(err) => {
                tracing::warn!(
                    comment_id = %comment.id,
                    recipe_id = %comment.recipe_id,
                    error = %err,
                    "comment notification not delivered"
                );
            }
        }
    }
}

/// Validates comment text: non-empty after trimming, at most
/// [`MAX_COMMENT_CHARS`] characters.
pub fn validate_comment_text(text: &str) -> CoreResult<()> {
    if text.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            "comment text must not be empty".to_string(),
        ));
    }
    let len = text.chars().count();
    if len > MAX_COMMENT_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "comment text is {} characters; maximum is {}",
            len, MAX_COMMENT_CHARS
        )));
    }
    Ok(())
}

/// Creates comments and announces them to live subscribers.
pub struct CommentNotifier {
    store: Arc<dyn PrimaryStore>,
    dispatcher: NotificationDispatcher,
    store_timeout: Duration,
}

impl CommentNotifier {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        dispatcher: NotificationDispatcher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            store_timeout,
        }
    }

    /// Persists the comment and enqueues its notification.
    ///
    /// Persistence errors propagate unchanged and nothing is published.
    /// Once persisted, the comment is returned even if the notification
    /// cannot be delivered.
    pub async fn create_comment(
        &self,
        text: &str,
        recipe_id: &str,
        author_id: &str,
    ) -> CoreResult<Comment> {
        validate_comment_text(text)?;
        let comment = with_timeout(
            "create comment",
            self.store_timeout,
            self.store.create_comment(text, recipe_id, author_id),
        )
        .await?;
        self.dispatcher.enqueue(comment.clone());
        Ok(comment)
    }

    /// Enqueues a notification for an already persisted comment.
    pub fn notify(&self, comment: &Comment) -> bool {
        self.dispatcher.enqueue(comment.clone())
    }

    pub async fn comments_for_recipe(&self, recipe_id: &str) -> CoreResult<Vec<Comment>> {
        with_timeout(
            "list comments",
            self.store_timeout,
            self.store.comments_for_recipe(recipe_id),
        )
        .await
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InProcessBus, Subscription};
    use crate::models::RecipeInput;
    use crate::store::InMemoryPrimaryStore;

    struct Fixture {
        bus: Arc<InProcessBus>,
        store: Arc<InMemoryPrimaryStore>,
        notifier: CommentNotifier,
        user_id: String,
        recipe_id: String,
    }

    async fn fixture() -> Fixture {
        let bus = Arc::new(InProcessBus::new(32));
        let store = Arc::new(InMemoryPrimaryStore::new());
        let user = store.create_user("ana", None).await.unwrap();
        let recipe = store
            .create_recipe(
                &user.id,
                &RecipeInput {
                    title: "Ramen".into(),
                    description: None,
                    cuisine: "Japanese".into(),
                    difficulty: "hard".into(),
                    cooking_time_minutes: 240,
                    ingredients: Vec::new(),
                    instructions: Vec::new(),
                },
            )
            .await
            .unwrap();
        let dispatcher = NotificationDispatcher::spawn(bus.clone(), 16);
        let notifier = CommentNotifier::new(store.clone(), dispatcher, Duration::from_secs(1));
        Fixture {
            bus,
            store,
            notifier,
            user_id: user.id,
            recipe_id: recipe.id,
        }
    }

    async fn next_event(sub: &mut Subscription) -> Option<crate::bus::Event> {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_persist_then_publish() {
        let f = fixture().await;
        let mut sub = f.bus.subscribe(COMMENT_ADDED_TOPIC).await.unwrap();
        let comment = f
            .notifier
            .create_comment("Great dish!", &f.recipe_id, &f.user_id)
            .await
            .unwrap();
        let event = next_event(&mut sub).await.expect("event");
        assert_eq!(event.payload["commentAdded"]["id"], comment.id.as_str());
        assert_eq!(event.payload["commentAdded"]["author"]["username"], "ana");
    }

    #[tokio::test]
    async fn test_failed_persist_publishes_nothing() {
        let f = fixture().await;
        let mut sub = f.bus.subscribe(COMMENT_ADDED_TOPIC).await.unwrap();
        let err = f
            .notifier
            .create_comment("hello", "no-such-recipe", &f.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        f.notifier.shutdown().await;
        assert_eq!(
            tokio::time::timeout(Duration::from_millis(50), sub.recv())
                .await
                .ok()
                .flatten(),
            None
        );
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates() {
        let f = fixture().await;
        f.store.set_available(false);
        let err = f
            .notifier
            .create_comment("hello", &f.recipe_id, &f.user_id)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bus_down_does_not_fail_write() {
        let f = fixture().await;
        f.bus.disconnect();
        let comment = f
            .notifier
            .create_comment("Great dish!", &f.recipe_id, &f.user_id)
            .await
            .unwrap();
        assert_eq!(comment.text, "Great dish!");
        f.notifier.shutdown().await;
        let stored = f.store.comments_for_recipe(&f.recipe_id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_text_validation() {
        let f = fixture().await;
        let too_long = "x".repeat(MAX_COMMENT_CHARS + 1);
        for bad in ["", "   ", too_long.as_str()] {
            let err = f
                .notifier
                .create_comment(bad, &f.recipe_id, &f.user_id)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(_)));
        }
        assert!(validate_comment_text(&"é".repeat(MAX_COMMENT_CHARS)).is_ok());
    }

    #[tokio::test]
    async fn test_events_keep_persist_order() {
        let f = fixture().await;
        let mut sub = f.bus.subscribe(COMMENT_ADDED_TOPIC).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..10 {
            let c = f
                .notifier
                .create_comment(&format!("comment {}", i), &f.recipe_id, &f.user_id)
                .await
                .unwrap();
            ids.push(c.id);
        }
        for id in ids {
            let event = next_event(&mut sub).await.expect("event");
            assert_eq!(event.payload["commentAdded"]["id"], id.as_str());
        }
    }
}
