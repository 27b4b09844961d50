use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::database::models::User;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub plain_body: String,
}

impl Email {
    /// Welcome message carrying the activation token for a new account.
    pub fn welcome(user: &User, activation_token: &str, expiry: DateTime<Utc>) -> Self {
        let plain_body = format!(
            "Hi {name},\n\n\
             Thanks for signing up for a Marquee account. Your user ID is {id}.\n\n\
             To activate your account, send a PUT /v1/users/activated request with:\n\n\
             {{\"token\": \"{token}\"}}\n\n\
             This token is valid until {expiry}.\n",
            name = user.name,
            id = user.id,
            token = activation_token,
            expiry = expiry.to_rfc2822(),
        );

        Self {
            to: user.email.clone(),
            subject: "Welcome to Marquee!".to_string(),
            plain_body,
        }
    }
}

/// Outbound mail boundary
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Writes outgoing mail to the log instead of an SMTP relay.
pub struct LogMailer {
    sender: String,
    relay: String,
}

impl LogMailer {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            sender: config.sender.clone(),
            relay: format!("{}:{}", config.host, config.port),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if email.to.is_empty() {
            return Err(MailError::Delivery {
                recipient: email.to,
                reason: "empty recipient".to_string(),
            });
        }

        info!(
            from = %self.sender,
            to = %email.to,
            subject = %email.subject,
            relay = %self.relay,
            "email sent"
        );
        debug!(body = %email.plain_body);
        Ok(())
    }
}
