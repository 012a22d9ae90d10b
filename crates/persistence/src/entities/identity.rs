//! Identity entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the identities table.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityEntity {
    pub user_id: Uuid,
    pub email: String,
    pub last_seen_at: DateTime<Utc>,
}

impl From<IdentityEntity> for domain::models::Identity {
    fn from(entity: IdentityEntity) -> Self {
        Self {
            user_id: entity.user_id,
            email: entity.email,
        }
    }
}
