/// Outgoing email
///
/// Ephemeral tokens reach users by email. The [`Mailer`] trait hides the
/// delivery mechanism:
///
/// - [`HttpMailer`]: posts `{from, to, subject, text}` as JSON to a
///   transactional mail provider, authenticated with a bearer API key
/// - [`LogMailer`]: writes the message to the log instead of sending it
///   (development and tests). The body, which carries the token, is only
///   logged at DEBUG.
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::auth::ephemeral::TokenPurpose;
/// use pmboard_shared::mail::{LogMailer, MailMessage, Mailer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = LogMailer::new("noreply@pmboard.dev");
/// let message = MailMessage::ephemeral_token("ada@example.com", TokenPurpose::Activate, "TOKEN");
/// mailer.send(&message).await?;
/// # Ok(())
/// # }
/// ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::ephemeral::{TokenPurpose, TOKEN_TTL_MINUTES};

/// Error type for mail delivery
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Mailer could not be constructed
    #[error("Invalid mailer configuration: {0}")]
    Config(String),

    /// Request to the provider failed
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Mail provider rejected the message with status {status}")]
    Rejected { status: u16 },
}

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,

    pub subject: String,

    pub text: String,
}

impl MailMessage {
    /// Builds the email carrying an ephemeral token
    pub fn ephemeral_token(to: impl Into<String>, purpose: TokenPurpose, token: &str) -> Self {
        let text = format!(
            "Use the following code to {}:\n\n{}\n\nThe code expires in {} minutes. \
             If you did not request it, you can ignore this email.",
            purpose.action(),
            token,
            TOKEN_TTL_MINUTES
        );

        Self {
            to: to.into(),
            subject: purpose.subject().to_string(),
            text,
        }
    }
}

/// Sends email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct ProviderPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Mailer backed by an HTTP mail provider
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let payload = ProviderPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Mail provider rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(subject = %message.subject, "Mail delivered to provider");
        Ok(())
    }
}

/// Mailer that logs messages instead of sending them
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            "Mail not sent (no provider configured)"
        );
        debug!(to = %message.to, body = %message.text, "Unsent mail body");
        Ok(())
    }
}
