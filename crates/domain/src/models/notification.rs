//! In-app notification models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Invitation,
    JoinRequest,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Invitation => "invitation",
            NotificationType::JoinRequest => "join_request",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invitation" => Ok(NotificationType::Invitation),
            "join_request" => Ok(NotificationType::JoinRequest),
            _ => Err(format!("Unknown notification type: {}", s)),
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a user's inbox. Immutable except for `is_read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub message: String,
    pub is_read: bool,
    /// Set when the notification was produced for a dispatch job.
    pub correlation_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data required to persist a new notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub message: String,
    pub correlation_key: Option<String>,
}

/// Notification as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub sender_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NewNotification {
    pub fn into_notification(self, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            event_id: self.event_id,
            notification_type: self.notification_type,
            message: self.message,
            is_read: false,
            correlation_key: self.correlation_key,
            created_at,
        }
    }
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            sender_id: n.sender_id,
            event_id: n.event_id,
            notification_type: n.notification_type,
            message: n.message,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

/// Response for listing notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListNotificationsResponse {
    pub data: Vec<NotificationResponse>,
    pub unread_count: usize,
}

impl ListNotificationsResponse {
    pub fn from_notifications(notifications: Vec<Notification>) -> Self {
        let unread_count = notifications.iter().filter(|n| !n.is_read).count();
        Self {
            data: notifications.into_iter().map(Into::into).collect(),
            unread_count,
        }
    }
}
