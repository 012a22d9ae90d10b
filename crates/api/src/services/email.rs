//! Email delivery for invitation and join-request notifications.
//!
//! Supports these providers:
//! - `console`: Logs emails to console (development)
//! - `sendgrid`: Uses the SendGrid v3 mail API
//!
//! When sending is disabled, messages are dropped after a debug log and
//! count as delivered. Provider failures are classified for the dispatcher:
//! network errors, timeouts, 5xx and 429 are transient; other 4xx responses
//! and malformed recipients are permanent.

use async_trait::async_trait;
use domain::services::{EmailMessage, MailError, MailTransport};
use reqwest::StatusCode;
use shared::validation::validate_email_address;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::EmailConfig;

/// Upper bound on a single provider request.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: reqwest::Client,
}

impl EmailService {
    /// Creates a new EmailService with the given configuration.
    pub fn new(config: EmailConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// Check if email service is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Console provider - logs email to console (for development).
    fn send_console(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            from = %self.config.sender_email,
            from_name = %self.config.sender_name,
            "Email (console provider)"
        );
        debug!(body_text = %message.body_text, "Email body (plain text)");
        if let Some(html) = &message.body_html {
            debug!(body_html_length = html.len(), "Email body (HTML)");
        }
        Ok(())
    }

    /// SendGrid provider - sends via SendGrid API.
    async fn send_sendgrid(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(MailError::Permanent(
                "SendGrid API key is not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.config.sendgrid_url)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&sendgrid_body(&self.config, message))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() {
            info!(to = %message.to, subject = %message.subject, "Email sent via SendGrid");
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        let err = classify_status(status, &error_body);
        if err.is_transient() {
            warn!(status = %status, error = %error_body, "SendGrid API error, will retry");
        } else {
            error!(status = %status, error = %error_body, "SendGrid rejected the message");
        }
        Err(err)
    }
}

#[async_trait]
impl MailTransport for EmailService {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if !self.config.enabled {
            debug!(
                to = %message.to,
                subject = %message.subject,
                "Email service disabled, skipping send"
            );
            return Ok(());
        }

        if validate_email_address(&message.to).is_err() {
            return Err(MailError::Permanent(format!(
                "invalid recipient address: {}",
                message.to
            )));
        }

        match self.config.provider.as_str() {
            "console" => self.send_console(message),
            "sendgrid" => self.send_sendgrid(message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(MailError::Permanent(format!(
                    "unknown email provider: {}",
                    provider
                )))
            }
        }
    }
}

fn sendgrid_body(config: &EmailConfig, message: &EmailMessage) -> serde_json::Value {
    let mut content = vec![serde_json::json!({
        "type": "text/plain",
        "value": message.body_text
    })];
    if let Some(html) = &message.body_html {
        content.push(serde_json::json!({
            "type": "text/html",
            "value": html
        }));
    }

    serde_json::json!({
        "personalizations": [{ "to": [{ "email": message.to }] }],
        "from": {
            "email": config.sender_email,
            "name": config.sender_name
        },
        "subject": message.subject,
        "content": content
    })
}

/// Classifies a non-success provider response.
fn classify_status(status: StatusCode, body: &str) -> MailError {
    let detail = format!("{}: {}", status.as_u16(), body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        MailError::Transient(detail)
    } else {
        MailError::Permanent(detail)
    }
}

/// Classifies a request that produced no response.
fn classify_request_error(err: reqwest::Error) -> MailError {
    if err.is_builder() {
        MailError::Permanent(format!("invalid provider request: {}", err))
    } else {
        MailError::Transient(format!("provider request failed: {}", err))
    }
}
