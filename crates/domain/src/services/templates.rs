//! Message rendering for dispatch jobs.

use std::str::FromStr;

use super::mail::EmailMessage;
use crate::models::{DispatchPayload, EventSummary, InvitationStatus};

/// Whether e-mails carry an HTML alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateStyle {
    #[default]
    Text,
    Html,
}

impl FromStr for TemplateStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(TemplateStyle::Text),
            "html" => Ok(TemplateStyle::Html),
            _ => Err(format!("Unknown template style: {}", s)),
        }
    }
}

/// Renders e-mails and inbox texts from dispatch payloads.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    app_name: String,
    base_url: String,
    style: TemplateStyle,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self::new("Watch Party", "http://localhost:3000", TemplateStyle::Text)
    }
}

impl MessageTemplates {
    pub fn new(app_name: impl Into<String>, base_url: impl Into<String>, style: TemplateStyle) -> Self {
        Self {
            app_name: app_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            style,
        }
    }

    /// Text of the in-app notification for the payload.
    pub fn inbox_message(&self, payload: &DispatchPayload) -> String {
        match payload {
            DispatchPayload::InvitationCreated(p) => format!(
                "You have received an invitation to the event: {}",
                p.event.title
            ),
            DispatchPayload::InvitationAnswered(p) => format!(
                "{} has {} your invitation to the event: {}",
                p.invitee_email,
                p.status,
                p.event.title
            ),
            DispatchPayload::JoinRequested(p) => format!(
                "{} has requested to join your event: {}",
                p.requester_email, p.event.title
            ),
        }
    }

    /// E-mail for the payload.
    ///
    /// `recipient_registered` selects the wording of invitation e-mails:
    /// invitees without an account are asked to sign up with the invited
    /// address.
    pub fn email(&self, payload: &DispatchPayload, recipient_registered: bool) -> EmailMessage {
        let (subject, body_text) = match payload {
            DispatchPayload::InvitationCreated(p) => {
                let action = if recipient_registered {
                    format!(
                        "Please log in to {} to accept or decline this invitation:\n{}/invitations",
                        self.app_name, self.base_url
                    )
                } else {
                    format!(
                        "You don't have an account yet. Please sign up at {} using this email \
                         address to respond to this invitation:\n{}/signup",
                        self.app_name, self.base_url
                    )
                };
                (
                    format!("Invitation to {}: {}", self.app_name, p.event.title),
                    format!(
                        "Hello!\n\nYou have been invited to join a watch party!\n\n{}\n\n{}\n\n{}",
                        event_details(&p.event),
                        action,
                        self.signature()
                    ),
                )
            }
            DispatchPayload::InvitationAnswered(p) => {
                let verb = match p.status {
                    InvitationStatus::Accepted => "accepted",
                    InvitationStatus::Declined => "declined",
                    InvitationStatus::Pending => "not yet answered",
                };
                (
                    format!("{} {} your invitation: {}", p.invitee_email, verb, p.event.title),
                    format!(
                        "Hello,\n\n{} has {} your invitation.\n\n{}\n\n\
                         See your guest list at {}/events/{}\n\n{}",
                        p.invitee_email,
                        verb,
                        event_details(&p.event),
                        self.base_url,
                        p.event.event_id,
                        self.signature()
                    ),
                )
            }
            DispatchPayload::JoinRequested(p) => (
                format!("Join Request for Event: {}", p.event.title),
                format!(
                    "Hello,\n\nA join request has been received for your event!\n\n\
                     Request Details:\n- From: {}\n{}\n\n\
                     Please log in to {} to manage this request:\n{}/events/{}\n\n{}",
                    p.requester_email,
                    event_details(&p.event),
                    self.app_name,
                    self.base_url,
                    p.event.event_id,
                    self.signature()
                ),
            ),
        };

        let body_html = match self.style {
            TemplateStyle::Text => None,
            TemplateStyle::Html => Some(self.wrap_html(&subject, &body_text)),
        };

        EmailMessage {
            to: payload.recipient_email().to_string(),
            subject,
            body_text,
            body_html,
        }
    }

    fn signature(&self) -> String {
        format!("Best regards,\nThe {} Team", self.app_name)
    }

    fn wrap_html(&self, title: &str, body_text: &str) -> String {
        let paragraphs: String = body_text
            .split("\n\n")
            .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
            .collect();
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="font-size: 24px;">{app}</h1>
    {paragraphs}
</body>
</html>"#,
            title = escape_html(title),
            app = escape_html(&self.app_name),
            paragraphs = paragraphs
        )
    }
}

fn event_details(event: &EventSummary) -> String {
    let mut details = format!(
        "Event Details:\n- Title: {}\n- Date: {}\n- Location: {}\n- Host: {}",
        event.title,
        event.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
        event.location,
        event.host_email
    );
    if !event.description.is_empty() {
        details.push_str(&format!("\n\nDescription: {}", event.description));
    }
    details
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvitationCreatedPayload, JoinRequestedPayload};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn summary() -> EventSummary {
        EventSummary {
            event_id: Uuid::nil(),
            title: "Dune <Part Two>".to_string(),
            description: "Bring snacks".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2030, 5, 1, 20, 0, 0).unwrap(),
            location: "Cinema".to_string(),
            host_id: Uuid::nil(),
            host_email: "host@example.com".to_string(),
        }
    }

    fn created() -> DispatchPayload {
        DispatchPayload::InvitationCreated(InvitationCreatedPayload {
            invitation_id: Uuid::nil(),
            invitee_email: "guest@example.com".to_string(),
            event: summary(),
        })
    }

    #[test]
    fn test_invitation_email_for_registered_invitee() {
        let templates = MessageTemplates::default();
        let email = templates.email(&created(), true);
        assert_eq!(email.to, "guest@example.com");
        assert_eq!(email.subject, "Invitation to Watch Party: Dune <Part Two>");
        assert!(email.body_text.contains("Please log in to Watch Party"));
        assert!(email.body_text.contains("2030-05-01 20:00 UTC"));
        assert!(email.body_text.contains("Description: Bring snacks"));
        assert!(email.body_html.is_none());
    }

    #[test]
    fn test_invitation_email_for_unregistered_invitee() {
        let templates = MessageTemplates::default();
        let email = templates.email(&created(), false);
        assert!(email.body_text.contains("You don't have an account yet"));
        assert!(email.body_text.ends_with("/signup\n\nBest regards,\nThe Watch Party Team"));
    }

    #[test]
    fn test_join_request_goes_to_host() {
        let templates = MessageTemplates::new("Watch Party", "https://wp.example.com/", TemplateStyle::Text);
        let payload = DispatchPayload::JoinRequested(JoinRequestedPayload {
            request_id: Uuid::nil(),
            requester_id: Uuid::nil(),
            requester_email: "fan@example.com".to_string(),
            event: summary(),
        });
        let email = templates.email(&payload, true);
        assert_eq!(email.to, "host@example.com");
        assert!(email.body_text.contains("- From: fan@example.com"));
        assert!(email
            .body_text
            .contains("https://wp.example.com/events/00000000-0000-0000-0000-000000000000"));
        assert_eq!(
            templates.inbox_message(&payload),
            "fan@example.com has requested to join your event: Dune <Part Two>"
        );
    }

    #[test]
    fn test_html_style_escapes() {
        let templates = MessageTemplates::new("Watch Party", "http://x", TemplateStyle::Html);
        let html = templates.email(&created(), true).body_html.unwrap();
        assert!(html.contains("Dune &lt;Part Two&gt;"));
        assert!(!html.contains("<Part Two>"));
    }

    #[test]
    fn test_template_style_from_str() {
        assert_eq!("HTML".parse::<TemplateStyle>().unwrap(), TemplateStyle::Html);
        assert_eq!("text".parse::<TemplateStyle>().unwrap(), TemplateStyle::Text);
        assert!("markdown".parse::<TemplateStyle>().is_err());
    }
}
