//! Dispatch job entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{DispatchJob, DispatchKind, DispatchStatus, StepState};
use domain::RepositoryError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for the kind of side-effect a job delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "dispatch_kind", rename_all = "snake_case")]
pub enum DispatchKindDb {
    InvitationCreated,
    InvitationAnswered,
    JoinRequested,
}

impl From<DispatchKindDb> for DispatchKind {
    fn from(db: DispatchKindDb) -> Self {
        match db {
            DispatchKindDb::InvitationCreated => DispatchKind::InvitationCreated,
            DispatchKindDb::InvitationAnswered => DispatchKind::InvitationAnswered,
            DispatchKindDb::JoinRequested => DispatchKind::JoinRequested,
        }
    }
}

impl From<DispatchKind> for DispatchKindDb {
    fn from(kind: DispatchKind) -> Self {
        match kind {
            DispatchKind::InvitationCreated => DispatchKindDb::InvitationCreated,
            DispatchKind::InvitationAnswered => DispatchKindDb::InvitationAnswered,
            DispatchKind::JoinRequested => DispatchKindDb::JoinRequested,
        }
    }
}

/// Database enum for job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "dispatch_status", rename_all = "lowercase")]
pub enum DispatchStatusDb {
    Pending,
    Delivered,
    Failed,
}

impl From<DispatchStatusDb> for DispatchStatus {
    fn from(db: DispatchStatusDb) -> Self {
        match db {
            DispatchStatusDb::Pending => DispatchStatus::Pending,
            DispatchStatusDb::Delivered => DispatchStatus::Delivered,
            DispatchStatusDb::Failed => DispatchStatus::Failed,
        }
    }
}

impl From<DispatchStatus> for DispatchStatusDb {
    fn from(status: DispatchStatus) -> Self {
        match status {
            DispatchStatus::Pending => DispatchStatusDb::Pending,
            DispatchStatus::Delivered => DispatchStatusDb::Delivered,
            DispatchStatus::Failed => DispatchStatusDb::Failed,
        }
    }
}

/// Database enum for the inbox and e-mail step columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "dispatch_step_state", rename_all = "lowercase")]
pub enum StepStateDb {
    Pending,
    Done,
    Skipped,
    Abandoned,
}

impl From<StepStateDb> for StepState {
    fn from(db: StepStateDb) -> Self {
        match db {
            StepStateDb::Pending => StepState::Pending,
            StepStateDb::Done => StepState::Done,
            StepStateDb::Skipped => StepState::Skipped,
            StepStateDb::Abandoned => StepState::Abandoned,
        }
    }
}

impl From<StepState> for StepStateDb {
    fn from(state: StepState) -> Self {
        match state {
            StepState::Pending => StepStateDb::Pending,
            StepState::Done => StepStateDb::Done,
            StepState::Skipped => StepStateDb::Skipped,
            StepState::Abandoned => StepStateDb::Abandoned,
        }
    }
}

/// Database row mapping for the dispatch_jobs table.
#[derive(Debug, Clone, FromRow)]
pub struct DispatchJobEntity {
    pub id: Uuid,
    pub correlation_key: String,
    pub kind: DispatchKindDb,
    pub payload: serde_json::Value,
    pub status: DispatchStatusDb,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub inbox_state: StepStateDb,
    pub email_state: StepStateDb,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn corrupt(id: Uuid, detail: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Corrupt(format!("dispatch job {}: {}", id, detail))
}

/// The payload and key are free-form, so a row whose kinds disagree is
/// reported as corrupt rather than skipped.
impl TryFrom<DispatchJobEntity> for DispatchJob {
    type Error = RepositoryError;

    fn try_from(entity: DispatchJobEntity) -> Result<Self, Self::Error> {
        let id = entity.id;
        let payload: domain::models::DispatchPayload =
            serde_json::from_value(entity.payload).map_err(|e| corrupt(id, e))?;
        let correlation_key: domain::models::CorrelationKey =
            entity.correlation_key.parse().map_err(|e| corrupt(id, e))?;
        let kind = DispatchKind::from(entity.kind);
        if correlation_key.kind != payload.kind() || kind != payload.kind() {
            return Err(corrupt(id, "kind does not match payload"));
        }

        Ok(Self {
            id,
            correlation_key,
            payload,
            status: entity.status.into(),
            attempts: entity.attempts,
            next_attempt_at: entity.next_attempt_at,
            locked_until: entity.locked_until,
            inbox_state: entity.inbox_state.into(),
            email_state: entity.email_state.into(),
            last_error: entity.last_error,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
