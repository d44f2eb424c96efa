//! Background service that turns platform events into in-app notifications.

use agora_core::automation::{completion_message, RUN_SUCCESS};
use agora_core::listing::{approval_message, rejection_message};
use agora_core::payouts::format_currency;
use agora_db::models::notification::CreateNotification;
use agora_db::repositories::{NotificationRepo, UserRepo};
use agora_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::{
    PlatformEvent, AUTOMATION_COMPLETED, MODEL_APPROVED, MODEL_REJECTED, PURCHASE_COMPLETED,
    WITHDRAWAL_DECIDED,
};
use crate::delivery::email::EmailDelivery;

pub struct Notifier {
    pool: DbPool,
    email: Option<EmailDelivery>,
}

impl Notifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, email: None }
    }

    /// Also email each notification to the recipient.
    pub fn with_email(mut self, email: Option<EmailDelivery>) -> Self {
        self.email = email;
        self
    }

    /// Run until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.handle(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notifier lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notifier shutting down");
                    break;
                }
            }
        }
    }

    async fn handle(&self, event: &PlatformEvent) {
        let Some(notification) = notification_for(event) else {
            return;
        };
        match NotificationRepo::create(&self.pool, &notification).await {
            Ok(n) => tracing::debug!(
                notification_id = n.id,
                user_id = n.user_id,
                event_type = %event.event_type,
                "Notification created"
            ),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type,
                    "Failed to create notification"
                );
                return;
            }
        }

        let Some(email) = &self.email else {
            return;
        };
        let recipient = match UserRepo::find_by_id(&self.pool, notification.user_id).await {
            Ok(Some(user)) => user.email,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up notification recipient");
                return;
            }
        };
        if let Err(e) = email
            .send_notice(&recipient, &notification.title, &notification.message)
            .await
        {
            tracing::warn!(error = %e, to = %recipient, "Notification email failed");
        }
    }
}

/// The notification an event produces, if any. Events without an actor
/// have nobody to notify.
pub fn notification_for(event: &PlatformEvent) -> Option<CreateNotification> {
    let user_id = event.actor_user_id?;
    let name = event.payload_str("name");
    let amount = event
        .payload
        .get("amount_cents")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();

    let (notification_type, title, message) = match event.event_type.as_str() {
        MODEL_APPROVED => (
            "model_approved",
            "Model approved".to_string(),
            approval_message(name),
        ),
        MODEL_REJECTED => (
            "model_rejected",
            "Model rejected".to_string(),
            rejection_message(name, event.payload_str("reason")),
        ),
        WITHDRAWAL_DECIDED => match event.payload_str("status") {
            "approved" => (
                "withdrawal_approved",
                "Withdrawal approved".to_string(),
                format!(
                    "Your withdrawal of {} has been approved and sent to PayPal.",
                    format_currency(amount)
                ),
            ),
            "rejected" => {
                let reason = event.payload_str("reason");
                let message = if reason.is_empty() {
                    format!("Your withdrawal of {} was rejected.", format_currency(amount))
                } else {
                    format!(
                        "Your withdrawal of {} was rejected. Reason: {reason}",
                        format_currency(amount)
                    )
                };
                ("withdrawal_rejected", "Withdrawal rejected".to_string(), message)
            }
            _ => return None,
        },
        PURCHASE_COMPLETED => (
            "purchase",
            "New sale".to_string(),
            format!(
                "Someone bought \"{}\". {} was added to your earnings.",
                event.payload_str("model_name"),
                format_currency(amount)
            ),
        ),
        AUTOMATION_COMPLETED => {
            let succeeded = event.payload_str("status") == RUN_SUCCESS;
            let error = Some(event.payload_str("error")).filter(|e| !e.is_empty());
            let message = completion_message(
                name,
                succeeded,
                event.payload.get("result").unwrap_or(&serde_json::Value::Null),
                error,
            );
            if succeeded {
                ("success", "Automation completed".to_string(), message)
            } else {
                ("error", "Automation failed".to_string(), message)
            }
        }
        _ => return None,
    };

    Some(CreateNotification {
        user_id,
        notification_type: notification_type.to_string(),
        title,
        message,
        entity_type: event.source_entity_type.clone(),
        entity_id: event.source_entity_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejection_carries_reason() {
        let event = PlatformEvent::new(MODEL_REJECTED)
            .with_source("model", 3)
            .with_actor(9)
            .with_payload(json!({"name": "Churn", "reason": "Missing weights"}));
        let n = notification_for(&event).unwrap();
        assert_eq!(n.user_id, 9);
        assert_eq!(n.notification_type, "model_rejected");
        assert_eq!(
            n.message,
            "Your model \"Churn\" has been rejected. Reason: Missing weights"
        );
        assert_eq!(n.entity_id, Some(3));
    }

    #[test]
    fn withdrawal_outcomes() {
        let approved = PlatformEvent::new(WITHDRAWAL_DECIDED)
            .with_actor(1)
            .with_payload(json!({"status": "approved", "amount_cents": 2500}));
        assert!(notification_for(&approved)
            .unwrap()
            .message
            .contains("$25.00"));

        let rejected = PlatformEvent::new(WITHDRAWAL_DECIDED)
            .with_actor(1)
            .with_payload(json!({"status": "rejected", "amount_cents": 100}));
        assert_eq!(
            notification_for(&rejected).unwrap().message,
            "Your withdrawal of $1.00 was rejected."
        );
    }

    #[test]
    fn automation_runs_notify_with_outcome() {
        let done = PlatformEvent::new(AUTOMATION_COMPLETED)
            .with_source("automation", 4)
            .with_actor(2)
            .with_payload(json!({"name": "TikTok Poster", "status": "success", "result": {"postsCreated": 3}}));
        let n = notification_for(&done).unwrap();
        assert_eq!(n.notification_type, "success");
        assert_eq!(n.message, "✅ TikTok Poster completed successfully - 3 posts created");

        let failed = PlatformEvent::new(AUTOMATION_COMPLETED)
            .with_actor(2)
            .with_payload(json!({"name": "TikTok Poster", "status": "failed", "error": "quota"}));
        let n = notification_for(&failed).unwrap();
        assert_eq!(n.notification_type, "error");
        assert_eq!(n.title, "Automation failed");
        assert_eq!(n.message, "❌ TikTok Poster failed: quota");
    }

    #[test]
    fn events_without_actor_or_unknown_type_are_skipped() {
        assert!(notification_for(&PlatformEvent::new(MODEL_APPROVED)).is_none());
        assert!(notification_for(&PlatformEvent::new("other.thing").with_actor(1)).is_none());
    }
}
