//! Mail transport abstraction.
//!
//! The dispatcher only needs to know whether a failed send is worth
//! retrying; providers classify their own errors into [`MailError`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Email message to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    /// Recipient email address
    pub to: String,
    /// Email subject
    pub subject: String,
    /// Plain text body
    pub body_text: String,
    /// HTML body (optional)
    pub body_html: Option<String>,
}

/// Delivery-path failure, never surfaced to the caller that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// Timeouts, network errors, 5xx and 429 responses.
    #[error("Transient mail failure: {0}")]
    Transient(String),

    /// Malformed recipients, rejected requests and hard bounces.
    #[error("Permanent mail failure: {0}")]
    Permanent(String),
}

impl MailError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MailError::Transient(_))
    }
}

/// Outbound e-mail transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Scripted behaviour of one [`MockMailTransport`] send.
#[derive(Debug, Clone)]
pub enum ScriptedSend {
    Deliver,
    Transient(String),
    Permanent(String),
    /// Sleeps before delivering, to exercise send timeouts.
    Stall(Duration),
}

/// Mail transport for development and testing.
///
/// Plays back scripted results in order and delivers once the script is
/// exhausted. Every call and every delivered message is recorded.
#[derive(Debug, Default)]
pub struct MockMailTransport {
    script: Mutex<VecDeque<ScriptedSend>>,
    calls: Mutex<Vec<EmailMessage>>,
    delivered: Mutex<Vec<EmailMessage>>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that plays back the given results first.
    pub fn scripted(script: impl IntoIterator<Item = ScriptedSend>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Messages handed to `send`, including failed attempts.
    pub fn calls(&self) -> Vec<EmailMessage> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Messages that were delivered.
    pub fn delivered(&self) -> Vec<EmailMessage> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> ScriptedSend {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(ScriptedSend::Deliver)
    }

    fn record(list: &Mutex<Vec<EmailMessage>>, message: &EmailMessage) {
        if let Ok(mut list) = list.lock() {
            list.push(message.clone());
        }
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        Self::record(&self.calls, message);

        match self.next_step() {
            ScriptedSend::Deliver => {}
            ScriptedSend::Transient(reason) => {
                tracing::warn!(to = %message.to, "Mock mail transport simulating transient failure");
                return Err(MailError::Transient(reason));
            }
            ScriptedSend::Permanent(reason) => {
                tracing::warn!(to = %message.to, "Mock mail transport simulating permanent failure");
                return Err(MailError::Permanent(reason));
            }
            ScriptedSend::Stall(delay) => tokio::time::sleep(delay).await,
        }

        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Mock: Would send email"
        );
        Self::record(&self.delivered, message);
        Ok(())
    }
}
