//! Outbound email.
//!
//! Messages are rendered from askama templates and handed to a [`Mailer`].
//! Delivery is fire-and-forget: [`dispatch`] spawns the send and only logs a
//! failure, so the request that triggered the email never fails because of it.

use askama::Template;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;

use crate::config::EmailConfig;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Delivery failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

#[derive(Template)]
#[template(path = "emails/verification.html")]
struct VerificationTemplate<'a> {
    name: &'a str,
    url: &'a str,
    minutes: i64,
}

#[derive(Template)]
#[template(path = "emails/reset_code.html")]
struct ResetCodeTemplate<'a> {
    name: &'a str,
    code: &'a str,
    minutes: i64,
}

pub fn verification_email(
    to: &str,
    name: &str,
    url: &str,
    minutes: i64,
) -> Result<OutgoingEmail, AppError> {
    let html = VerificationTemplate { name, url, minutes }
        .render()
        .map_err(|e| AppError::Internal(format!("Template error: {e}")))?;
    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: "Confirm Your iHighlight Account".to_string(),
        html,
    })
}

pub fn reset_code_email(
    to: &str,
    name: &str,
    code: &str,
    minutes: i64,
) -> Result<OutgoingEmail, AppError> {
    let html = ResetCodeTemplate { name, code, minutes }
        .render()
        .map_err(|e| AppError::Internal(format!("Template error: {e}")))?;
    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: "Reset Your iHighlight Password".to_string(),
        html,
    })
}

/// Send in the background; failures are logged at warn.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: OutgoingEmail) {
    tokio::spawn(async move {
        let subject = email.subject.clone();
        if let Err(e) = mailer.send(email).await {
            tracing::warn!(subject = %subject, "Email delivery failed: {}", e);
        }
    });
}

/// SMTP delivery. With no host configured it logs instead of sending.
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", config.from)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            tracing::warn!("SMTP host not configured; emails will be logged, not sent");
            None
        } else {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(config.smtp_port);

            let builder = match (&config.smtp_username, &config.smtp_password) {
                (Some(username), Some(password)) => {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                }
                _ => builder,
            };
            Some(builder.build())
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            tracing::info!(to = %email.to, subject = %email.subject, "Mailer disabled; skipping send");
            return Ok(());
        };

        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", email.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(header::ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| MailError::Build(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(subject = %email.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_email_links_activation_url() {
        let email = verification_email(
            "a@x.com",
            "Anna",
            "http://localhost:3000/activate/abc.def.ghi",
            30,
        )
        .unwrap();
        assert_eq!(email.to, "a@x.com");
        assert!(email.html.contains("Hello Anna"));
        assert!(email.html.contains("http://localhost:3000/activate/abc.def.ghi"));
        assert!(email.html.contains("30 minutes"));
    }

    #[test]
    fn reset_email_carries_code() {
        let email = reset_code_email("a@x.com", "Anna", "x7Kq2", 15).unwrap();
        assert!(email.html.contains("x7Kq2"));
        assert!(email.subject.contains("Password"));
    }

    #[test]
    fn names_are_html_escaped() {
        let email = reset_code_email("a@x.com", "<b>Anna</b>", "x7Kq2", 15).unwrap();
        assert!(!email.html.contains("<b>Anna</b>"));
    }

    #[tokio::test]
    async fn disabled_mailer_accepts_and_drops() {
        let mailer = SmtpMailer::new(&EmailConfig::default()).unwrap();
        assert!(!mailer.is_enabled());
        let email = reset_code_email("a@x.com", "Anna", "x7Kq2", 15).unwrap();
        assert!(mailer.send(email).await.is_ok());
    }

    #[test]
    fn bad_from_address_is_rejected() {
        let config = EmailConfig {
            from: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(
            SmtpMailer::new(&config),
            Err(MailError::Address(_))
        ));
    }
}
