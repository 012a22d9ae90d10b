//! Delivery audit entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AuditOutcome, DeliveryAudit};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for the outcome of one delivery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "delivery_outcome", rename_all = "lowercase")]
pub enum AuditOutcomeDb {
    Delivered,
    Retrying,
    Failed,
}

impl From<AuditOutcomeDb> for AuditOutcome {
    fn from(db: AuditOutcomeDb) -> Self {
        match db {
            AuditOutcomeDb::Delivered => AuditOutcome::Delivered,
            AuditOutcomeDb::Retrying => AuditOutcome::Retrying,
            AuditOutcomeDb::Failed => AuditOutcome::Failed,
        }
    }
}

impl From<AuditOutcome> for AuditOutcomeDb {
    fn from(outcome: AuditOutcome) -> Self {
        match outcome {
            AuditOutcome::Delivered => AuditOutcomeDb::Delivered,
            AuditOutcome::Retrying => AuditOutcomeDb::Retrying,
            AuditOutcome::Failed => AuditOutcomeDb::Failed,
        }
    }
}

/// Database row mapping for the delivery_audit table.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryAuditEntity {
    pub id: Uuid,
    pub job_id: Uuid,
    pub correlation_key: String,
    pub attempt: i32,
    pub outcome: AuditOutcomeDb,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<DeliveryAuditEntity> for DeliveryAudit {
    fn from(entity: DeliveryAuditEntity) -> Self {
        Self {
            id: entity.id,
            job_id: entity.job_id,
            correlation_key: entity.correlation_key,
            attempt: entity.attempt,
            outcome: entity.outcome.into(),
            error: entity.error,
            recorded_at: entity.recorded_at,
        }
    }
}
