//! Notification entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::NotificationType;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
pub enum NotificationTypeDb {
    Invitation,
    JoinRequest,
}

impl From<NotificationTypeDb> for NotificationType {
    fn from(db: NotificationTypeDb) -> Self {
        match db {
            NotificationTypeDb::Invitation => NotificationType::Invitation,
            NotificationTypeDb::JoinRequest => NotificationType::JoinRequest,
        }
    }
}

impl From<NotificationType> for NotificationTypeDb {
    fn from(kind: NotificationType) -> Self {
        match kind {
            NotificationType::Invitation => NotificationTypeDb::Invitation,
            NotificationType::JoinRequest => NotificationTypeDb::JoinRequest,
        }
    }
}

/// Database row mapping for the notifications table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationEntity {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub notification_type: NotificationTypeDb,
    pub message: String,
    pub is_read: bool,
    pub correlation_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationEntity> for domain::models::Notification {
    fn from(entity: NotificationEntity) -> Self {
        Self {
            id: entity.id,
            recipient_id: entity.recipient_id,
            sender_id: entity.sender_id,
            event_id: entity.event_id,
            notification_type: entity.notification_type.into(),
            message: entity.message,
            is_read: entity.is_read,
            correlation_key: entity.correlation_key,
            created_at: entity.created_at,
        }
    }
}
