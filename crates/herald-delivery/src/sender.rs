//! SMTP sender behind the `EmailSender` seam.
//!
//! Builds a multipart alternative message (plain text + HTML) when both
//! variants are present and sends it over an async SMTP transport. The
//! trait seam lets the processor run against scripted senders in tests.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Username; empty disables authentication.
    pub username: String,
    /// Password.
    pub password: String,
    /// Sender address.
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "no-reply@herald.local".to_string(),
        }
    }
}

/// A composed email ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
    /// Plain-text alternative.
    pub text_body: Option<String>,
}

/// Sender contract used by the processor.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one email.
    async fn send(&self, email: &EmailMessage) -> Result<()>;
}

/// Sender backed by an async SMTP transport.
#[derive(Debug)]
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    /// Creates a sender from the relay configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the sender address or relay
    /// settings are invalid.
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| DeliveryError::configuration(format!("invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::configuration(format!("invalid smtp relay: {e}")))?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username, config.password));
        }

        Ok(Self { transport: builder.build(), from })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, email: &EmailMessage) -> Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| DeliveryError::invalid_job(format!("invalid recipient: {e}")))?;

        let builder =
            Message::builder().from(self.from.clone()).to(to).subject(email.subject.clone());

        let message = match &email.text_body {
            Some(text) => builder.multipart(MultiPart::alternative_plain_html(
                text.clone(),
                email.html_body.clone(),
            )),
            None => builder.header(ContentType::TEXT_HTML).body(email.html_body.clone()),
        }
        .map_err(|e| DeliveryError::invalid_job(format!("failed to build message: {e}")))?;

        debug!(to = %email.to, subject = %email.subject, "sending email");

        self.transport.send(message).await.map_err(|e| DeliveryError::smtp(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_valid_config() {
        let sender = SmtpSender::new(SmtpConfig::default());
        assert!(sender.is_ok());
    }

    #[test]
    fn rejects_invalid_from_address() {
        let config = SmtpConfig { from: "not an address".into(), ..Default::default() };
        let err = SmtpSender::new(config).unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration { .. }));
    }
}
