//! Delivery of sign-in passcodes.

use agora_events::{EmailDelivery, EmailError};
use async_trait::async_trait;

#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError>;
}

/// Sends the code over SMTP.
pub struct SmtpMailer {
    delivery: EmailDelivery,
}

impl SmtpMailer {
    pub fn new(delivery: EmailDelivery) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl OtpMailer for SmtpMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        self.delivery.send_otp(email, code).await
    }
}

/// Development mailer used when SMTP is not configured: the code goes to
/// the log instead of an inbox.
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        tracing::warn!(to = email, code, "SMTP not configured, verification code logged");
        Ok(())
    }
}
