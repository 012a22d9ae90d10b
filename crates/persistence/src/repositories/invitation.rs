//! Invitation repository for database operations.
//!
//! The unit of mutual exclusion is the invitation row for an (event, e-mail)
//! pair. Inserts lock any existing row first; the unique constraint on the
//! pair catches the case where no row existed to lock.

use async_trait::async_trait;
use domain::models::{Invitation, InvitationAnswer, NewDispatchJob, NewInvitation};
use domain::repositories::{InsertInvitationOutcome, InvitationRepository, RecordAnswerOutcome};
use domain::RepoResult;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::dispatch::insert_job;
use super::{db_err, is_unique_violation};
use crate::entities::{InvitationEntity, InvitationStatusDb};
use crate::metrics::QueryTimer;

/// Takes a transaction-scoped advisory lock on an (event, e-mail) pair.
///
/// Serializes invitation inserts with join requests for the same pair,
/// including when no invitation row exists yet.
pub(crate) async fn lock_pair(
    conn: &mut PgConnection,
    event_id: Uuid,
    email: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("{}:{}", event_id, email))
        .execute(conn)
        .await?;
    Ok(())
}

/// Repository for invitation-related database operations.
#[derive(Clone)]
pub struct PgInvitationRepository {
    pool: PgPool,
}

impl PgInvitationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an invitation by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<InvitationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_invitation_by_id");
        let result = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find the invitation of an e-mail to an event.
    pub async fn find_by_event_and_email(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> Result<Option<InvitationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_invitation_by_event_and_email");
        let result = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE event_id = $1 AND invitee_email = $2
            "#,
        )
        .bind(event_id)
        .bind(invitee_email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List invitations addressed to an e-mail, newest first.
    pub async fn list_by_email(&self, email: &str) -> Result<Vec<InvitationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_invitations_by_email");
        let result = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE invitee_email = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Insert an invitation and its dispatch job in one transaction.
    ///
    /// Returns the existing row instead when the pair is already invited.
    pub async fn insert_with_job(
        &self,
        new: &NewInvitation,
        job: &NewDispatchJob,
    ) -> Result<Result<InvitationEntity, InvitationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_invitation");
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut *tx, new.event_id, &new.invitee_email).await?;

        let existing = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE event_id = $1 AND invitee_email = $2
            FOR UPDATE
            "#,
        )
        .bind(new.event_id)
        .bind(&new.invitee_email)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            tx.rollback().await?;
            timer.record();
            return Ok(Err(existing));
        }

        let inserted = sqlx::query_as::<_, InvitationEntity>(
            r#"
            INSERT INTO invitations (id, event_id, invitee_email, invitee_id, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            "#,
        )
        .bind(new.id)
        .bind(new.event_id)
        .bind(&new.invitee_email)
        .bind(new.invitee_id)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(inserted) => inserted,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent insert for the same pair committed first.
                tracing::warn!(
                    event_id = %new.event_id,
                    "Invitation insert lost a race past the pair lock, reporting the existing row"
                );
                tx.rollback().await?;
                timer.record();
                return match self
                    .find_by_event_and_email(new.event_id, &new.invitee_email)
                    .await?
                {
                    Some(existing) => Ok(Err(existing)),
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        insert_job(&mut *tx, job).await?;
        tx.commit().await?;
        timer.record();
        Ok(Ok(inserted))
    }

    /// Apply an answer under the row lock, together with its dispatch job.
    pub async fn answer_with_job(
        &self,
        answer: &InvitationAnswer,
        job: &NewDispatchJob,
    ) -> Result<RecordAnswerOutcome, sqlx::Error> {
        let timer = QueryTimer::new("answer_invitation");
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(answer.invitation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            timer.record();
            return Ok(RecordAnswerOutcome::Missing);
        };
        if current.status != InvitationStatusDb::Pending {
            tx.rollback().await?;
            timer.record();
            return Ok(RecordAnswerOutcome::NotPending(current.into()));
        }

        let answered = sqlx::query_as::<_, InvitationEntity>(
            r#"
            UPDATE invitations
            SET status = $2,
                responded_at = $3,
                invitee_id = COALESCE(invitee_id, $4)
            WHERE id = $1
            RETURNING id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            "#,
        )
        .bind(answer.invitation_id)
        .bind(InvitationStatusDb::from(answer.status))
        .bind(answer.responded_at)
        .bind(answer.responder_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_job(&mut *tx, job).await?;
        tx.commit().await?;
        timer.record();
        Ok(RecordAnswerOutcome::Answered(answered.into()))
    }
}

#[async_trait]
impl InvitationRepository for PgInvitationRepository {
    async fn insert_invitation(
        &self,
        new: NewInvitation,
        job: NewDispatchJob,
    ) -> RepoResult<InsertInvitationOutcome> {
        match self.insert_with_job(&new, &job).await.map_err(db_err)? {
            Ok(inserted) => Ok(InsertInvitationOutcome::Inserted(inserted.into())),
            Err(existing) => Ok(InsertInvitationOutcome::AlreadyExists(existing.into())),
        }
    }

    async fn find_invitation(&self, invitation_id: Uuid) -> RepoResult<Option<Invitation>> {
        self.find_by_id(invitation_id)
            .await
            .map(|i| i.map(Into::into))
            .map_err(db_err)
    }

    async fn find_invitation_for(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> RepoResult<Option<Invitation>> {
        let email = shared::validation::normalize_email(invitee_email);
        self.find_by_event_and_email(event_id, &email)
            .await
            .map(|i| i.map(Into::into))
            .map_err(db_err)
    }

    async fn record_answer(
        &self,
        answer: InvitationAnswer,
        job: NewDispatchJob,
    ) -> RepoResult<RecordAnswerOutcome> {
        self.answer_with_job(&answer, &job).await.map_err(db_err)
    }

    async fn list_invitations_for_email(&self, email: &str) -> RepoResult<Vec<Invitation>> {
        let email = shared::validation::normalize_email(email);
        self.list_by_email(&email)
            .await
            .map(|list| list.into_iter().map(Into::into).collect())
            .map_err(db_err)
    }
}
