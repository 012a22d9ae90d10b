//! Event entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the events table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub host_id: Uuid,
    pub host_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EventEntity> for domain::models::Event {
    fn from(entity: EventEntity) -> Self {
        Self {
            id: entity.id,
            title: entity.title,
            description: entity.description,
            scheduled_at: entity.scheduled_at,
            location: entity.location,
            host_id: entity.host_id,
            host_email: entity.host_email,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
