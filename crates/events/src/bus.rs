//! In-process event bus.
//!
//! Handlers publish a [`PlatformEvent`] after a state change commits;
//! background services such as the [`Notifier`](crate::notifier::Notifier)
//! subscribe and react. Share the bus as `Arc<EventBus>`.

use agora_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A moderator approved a listing. Payload: `{name}`.
pub const MODEL_APPROVED: &str = "model.approved";
/// A moderator rejected and removed a listing. Payload: `{name, reason}`.
pub const MODEL_REJECTED: &str = "model.rejected";
/// An admin decided a payout. Payload: `{status, amount_cents, reason?}`.
pub const WITHDRAWAL_DECIDED: &str = "withdrawal.decided";
/// A paid order was recorded. Payload: `{model_name, amount_cents}`.
pub const PURCHASE_COMPLETED: &str = "purchase.completed";
/// The runner finished a background or scheduled run.
/// Payload: `{name, status, result, error?}`.
pub const AUTOMATION_COMPLETED: &str = "automation.completed";

/// A domain event that occurred on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"model.approved"`.
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    /// The user the event is about. Notifications go to this user.
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// String field of the payload, empty when absent.
    pub fn payload_str(&self, key: &str) -> &str {
        self.payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus; every subscriber sees every event.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when there are none.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_enriched_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PlatformEvent::new(MODEL_REJECTED)
                .with_source("model", 42)
                .with_actor(7)
                .with_payload(serde_json::json!({"name": "Churn", "reason": "Broken file"})),
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, MODEL_REJECTED);
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.payload_str("reason"), "Broken file");
        assert_eq!(received.payload_str("missing"), "");
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new(PURCHASE_COMPLETED));

        assert_eq!(rx1.recv().await.unwrap().event_type, PURCHASE_COMPLETED);
        assert_eq!(rx2.recv().await.unwrap().event_type, PURCHASE_COMPLETED);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventBus::default().publish(PlatformEvent::new(MODEL_APPROVED));
    }
}
