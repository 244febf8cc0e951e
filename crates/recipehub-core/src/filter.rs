//! Subscription filter engine.
//!
//! Every subscriber receives every event on the shared topic and discards
//! the ones that don't concern it. What a subscriber wants is described by
//! a [`SubscriptionDescriptor`], a plain tagged value rather than a closure,
//! so predicates and reshaping can be inspected and tested on their own.
//!
//! A payload that fails to decode is dropped and logged. It never ends the
//! stream: one bad publisher must not disconnect unrelated clients.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;

use crate::bus::{Event, EventBus, Subscription};
use crate::error::{CoreError, CoreResult};
use crate::models::{AuthorSnapshot, Comment};

/// Single logical channel shared by all recipes.
pub const COMMENT_ADDED_TOPIC: &str = "commentAdded";

/// What a consumer subscribed to, including the subscription-time parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionDescriptor {
    /// New comments on one recipe, matched by exact id.
    CommentAdded { recipe_id: String },
}

/// A filtered, reshaped event ready for the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CommentAdded(Comment),
}

impl SubscriptionDescriptor {
    pub fn comment_added(recipe_id: impl Into<String>) -> Self {
        Self::CommentAdded {
            recipe_id: recipe_id.into(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Self::CommentAdded { .. } => COMMENT_ADDED_TOPIC,
        }
    }

    /// Applies predicate and reshape to one raw event.
    ///
    /// `Ok(None)` means the event is well formed but not for this
    /// subscriber; `Err(MalformedPayload)` means it could not be decoded.
    pub fn evaluate(&self, event: &Event) -> CoreResult<Option<Notification>> {
        if event.topic != self.topic() {
            return Ok(None);
        }
        match self {
            Self::CommentAdded { recipe_id } => {
                let envelope: CommentAddedEnvelope = serde_json::from_value(event.payload.clone())
                    .map_err(|e| CoreError::MalformedPayload(e.to_string()))?;
                let wire = envelope.comment_added;
                if &wire.recipe_id != recipe_id {
                    return Ok(None);
                }
                Ok(Some(Notification::CommentAdded(wire.into_comment()?)))
            }
        }
    }
}

/// Builds the payload published for a freshly persisted comment.
pub fn comment_added_payload(comment: &Comment) -> Value {
    serde_json::json!({ "commentAdded": comment })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentAddedEnvelope {
    comment_added: WireComment,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    id: String,
    text: String,
    recipe_id: String,
    author_id: String,
    author: AuthorSnapshot,
    created_at: Value,
}

impl WireComment {
    fn into_comment(self) -> CoreResult<Comment> {
        Ok(Comment {
            created_at: normalize_timestamp(&self.created_at)?,
            id: self.id,
            text: self.text,
            recipe_id: self.recipe_id,
            author_id: self.author_id,
            author: self.author,
        })
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
pub fn normalize_timestamp(raw: &Value) -> CoreResult<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CoreError::MalformedPayload(format!("createdAt '{}': {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| CoreError::MalformedPayload(format!("createdAt out of range: {}", n))),
        other => Err(CoreError::MalformedPayload(format!(
            "createdAt has unsupported type: {}",
            other
        ))),
    }
}

/// A raw bus subscription narrowed by a [`SubscriptionDescriptor`].
#[derive(Debug)]
pub struct FilteredSubscription {
    descriptor: SubscriptionDescriptor,
    inner: Subscription,
}

impl FilteredSubscription {
    /// Opens a subscription on the descriptor's topic.
    pub async fn open(
        bus: &dyn EventBus,
        descriptor: SubscriptionDescriptor,
    ) -> CoreResult<Self> {
        let inner = bus.subscribe(descriptor.topic()).await?;
        Ok(Self { descriptor, inner })
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.descriptor
    }

    /// Next matching notification, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            let event = self.inner.recv().await?;
            match self.descriptor.evaluate(&event) {
                Ok(Some(notification)) => return Some(notification),
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(
                        topic = %event.topic,
                        descriptor = ?self.descriptor,
                        error = %err,
                        "dropping malformed event"
                    );
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    pub fn into_stream(self) -> impl Stream<Item = Notification> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let notification = sub.next().await?;
            Some((notification, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use serde_json::json;

    fn comment(id: &str, recipe_id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            text: "Great dish!".to_string(),
            recipe_id: recipe_id.to_string(),
            author_id: "u1".to_string(),
            author: AuthorSnapshot {
                id: "u1".to_string(),
                username: "ana".to_string(),
                display_name: Some("Ana".to_string()),
            },
            created_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_predicate_is_exact_match() {
        let descriptor = SubscriptionDescriptor::comment_added("r1");
        let hit = Event::new(COMMENT_ADDED_TOPIC, comment_added_payload(&comment("c1", "r1")));
        let miss = Event::new(COMMENT_ADDED_TOPIC, comment_added_payload(&comment("c2", "r10")));
        assert!(matches!(
            descriptor.evaluate(&hit),
            Ok(Some(Notification::CommentAdded(_)))
        ));
        assert_eq!(descriptor.evaluate(&miss), Ok(None));
    }

    #[test]
    fn test_other_topic_ignored() {
        let descriptor = SubscriptionDescriptor::comment_added("r1");
        let event = Event::new("recipeUpdated", json!({"anything": true}));
        assert_eq!(descriptor.evaluate(&event), Ok(None));
    }

    #[test]
    fn test_reshape_normalizes_epoch_millis() {
        let descriptor = SubscriptionDescriptor::comment_added("r1");
        let mut payload = comment_added_payload(&comment("c1", "r1"));
        payload["commentAdded"]["createdAt"] = json!(1_714_564_800_000i64);
        let event = Event::new(COMMENT_ADDED_TOPIC, payload);
        match descriptor.evaluate(&event) {
            Ok(Some(Notification::CommentAdded(c))) => {
                assert_eq!(c.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reshape_normalizes_offset_strings() {
        let value = json!("2024-05-01T14:00:00+02:00");
        let ts = normalize_timestamp(&value).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let descriptor = SubscriptionDescriptor::comment_added("r1");
        let event = Event::new(COMMENT_ADDED_TOPIC, json!({"commentAdded": {"id": 5}}));
        assert!(matches!(
            descriptor.evaluate(&event),
            Err(CoreError::MalformedPayload(_))
        ));

        let mut payload = comment_added_payload(&comment("c1", "r1"));
        payload["commentAdded"]["createdAt"] = json!(true);
        let event = Event::new(COMMENT_ADDED_TOPIC, payload);
        assert!(matches!(
            descriptor.evaluate(&event),
            Err(CoreError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_end_stream() {
        let bus = InProcessBus::new(16);
        let mut sub = FilteredSubscription::open(&bus, SubscriptionDescriptor::comment_added("r1"))
            .await
            .unwrap();
        bus.publish(COMMENT_ADDED_TOPIC, json!("garbage")).await.unwrap();
        bus.publish(COMMENT_ADDED_TOPIC, comment_added_payload(&comment("c0", "r2")))
            .await
            .unwrap();
        bus.publish(COMMENT_ADDED_TOPIC, comment_added_payload(&comment("c1", "r1")))
            .await
            .unwrap();
        match sub.next().await {
            Some(Notification::CommentAdded(c)) => assert_eq!(c.id, "c1"),
            None => panic!("stream ended early"),
        }
    }

    #[tokio::test]
    async fn test_stream_ends_after_cancel() {
        let bus = InProcessBus::new(16);
        let mut sub = FilteredSubscription::open(&bus, SubscriptionDescriptor::comment_added("r1"))
            .await
            .unwrap();
        bus.publish(COMMENT_ADDED_TOPIC, comment_added_payload(&comment("c1", "r1")))
            .await
            .unwrap();
        sub.cancel();
        assert!(sub.next().await.is_none());
        assert_eq!(bus.subscriber_count(COMMENT_ADDED_TOPIC), 0);
    }
}
