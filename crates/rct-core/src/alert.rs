//! Best-effort human notification.
//!
//! A [`Notifier`] never returns an error and never panics: a failed alert is
//! logged and dropped so the caller's control flow is unaffected.

use crate::config::AlertConfig;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{error, info, warn};

pub const SUBJECT_PREFIX: &str = "[RCT Alert] ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

pub trait Notifier {
    fn send(&self, message: &AlertMessage);
}

// ---------------------------------------------------------------------------
// EmailNotifier
// ---------------------------------------------------------------------------

/// SMTP (STARTTLS, port 587) notifier.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    config: AlertConfig,
}

impl EmailNotifier {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    fn build(&self, message: &AlertMessage) -> Result<(Message, Credentials), String> {
        let (Some(sender), Some(password), Some(receiver)) = (
            self.config.sender.as_deref(),
            self.config.password.as_deref(),
            self.config.receiver.as_deref(),
        ) else {
            return Err("alert credentials missing".to_string());
        };
        let email = Message::builder()
            .from(sender.parse().map_err(|e| format!("sender address: {e}"))?)
            .to(receiver.parse().map_err(|e| format!("receiver address: {e}"))?)
            .subject(subject_line(&message.subject))
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| e.to_string())?;
        Ok((email, Credentials::new(sender.to_string(), password.to_string())))
    }

    fn deliver(&self, message: &AlertMessage) -> Result<(), String> {
        let (email, credentials) = self.build(message)?;
        let mailer = SmtpTransport::starttls_relay(&self.config.smtp_host)
            .map_err(|e| e.to_string())?
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(30)))
            .build();
        mailer.send(&email).map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl Notifier for EmailNotifier {
    fn send(&self, message: &AlertMessage) {
        if !self.config.has_credentials() {
            warn!(subject = %message.subject, "alert email settings are missing; skipping notification");
            return;
        }
        match self.deliver(message) {
            Ok(()) => info!(
                receiver = self.config.receiver.as_deref().unwrap_or_default(),
                "alert email sent"
            ),
            Err(e) => error!(subject = %message.subject, "failed to send alert email: {e}"),
        }
    }
}

pub fn subject_line(subject: &str) -> String {
    format!("{SUBJECT_PREFIX}{subject}")
}
