//! Email delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. It sends the
//! sign-in passcode and a plain-text copy of each notification. If
//! `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and no
//! mailer should be constructed.

use agora_core::otp::CODE_TTL_MINS;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@agora.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// | Variable        | Required | Default               |
    /// |-----------------|----------|-----------------------|
    /// | `SMTP_HOST`     | yes      |                       |
    /// | `SMTP_PORT`     | no       | `587`                 |
    /// | `SMTP_FROM`     | no       | `noreply@agora.local` |
    /// | `SMTP_USER`     | no       |                       |
    /// | `SMTP_PASSWORD` | no       |                       |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

/// Subject and body of the passcode email.
pub fn otp_email(code: &str) -> (String, String) {
    (
        format!("Your Agora verification code: {code}"),
        format!(
            "Your verification code is {code}.\n\n\
             It expires in {CODE_TTL_MINS} minutes. If you did not request it, \
             you can ignore this email."
        ),
    )
}

/// Subject and body of a notification email.
pub fn notice_email(title: &str, message: &str) -> (String, String) {
    (
        format!("[Agora] {title}"),
        format!("{message}\n\nYou can review this in your Agora notifications."),
    )
}

pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub async fn send_otp(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        let (subject, body) = otp_email(code);
        self.send(to_email, subject, body).await?;
        tracing::info!(to = to_email, "Verification code email sent");
        Ok(())
    }

    /// Send a notification as a plain-text email.
    pub async fn send_notice(
        &self,
        to_email: &str,
        title: &str,
        message: &str,
    ) -> Result<(), EmailError> {
        let (subject, body) = notice_email(title, message);
        self.send(to_email, subject, body).await?;
        tracing::info!(to = to_email, %title, "Notification email sent");
        Ok(())
    }

    async fn send(&self, to_email: &str, subject: String, body: String) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);
        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        transport.build().send(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_email_mentions_code_and_expiry() {
        let (subject, body) = otp_email("042913");
        assert!(subject.ends_with("042913"));
        assert!(body.contains("042913"));
        assert!(body.contains("10 minutes"));
    }

    #[test]
    fn notice_email_carries_title_and_message() {
        let (subject, body) = notice_email("Model approved", "Your model is live.");
        assert_eq!(subject, "[Agora] Model approved");
        assert!(body.starts_with("Your model is live."));
    }

    #[test]
    fn email_error_display() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");

        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
