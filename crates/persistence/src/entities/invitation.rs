//! Invitation entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::InvitationStatus;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for invitation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
pub enum InvitationStatusDb {
    Pending,
    Accepted,
    Declined,
}

impl From<InvitationStatusDb> for InvitationStatus {
    fn from(db: InvitationStatusDb) -> Self {
        match db {
            InvitationStatusDb::Pending => InvitationStatus::Pending,
            InvitationStatusDb::Accepted => InvitationStatus::Accepted,
            InvitationStatusDb::Declined => InvitationStatus::Declined,
        }
    }
}

impl From<InvitationStatus> for InvitationStatusDb {
    fn from(status: InvitationStatus) -> Self {
        match status {
            InvitationStatus::Pending => InvitationStatusDb::Pending,
            InvitationStatus::Accepted => InvitationStatusDb::Accepted,
            InvitationStatus::Declined => InvitationStatusDb::Declined,
        }
    }
}

/// Database row mapping for the invitations table.
#[derive(Debug, Clone, FromRow)]
pub struct InvitationEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
    pub status: InvitationStatusDb,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<InvitationEntity> for domain::models::Invitation {
    fn from(entity: InvitationEntity) -> Self {
        Self {
            id: entity.id,
            event_id: entity.event_id,
            invitee_email: entity.invitee_email,
            invitee_id: entity.invitee_id,
            status: entity.status.into(),
            created_at: entity.created_at,
            responded_at: entity.responded_at,
        }
    }
}
