//! Notification repository for database operations.

use async_trait::async_trait;
use domain::models::{NewDispatchJob, NewNotification, Notification};
use domain::repositories::{JoinRequestOutcome, NotificationRepository};
use domain::RepoResult;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::db_err;
use super::dispatch::insert_job;
use super::invitation::lock_pair;
use crate::entities::{InvitationEntity, NotificationEntity, NotificationTypeDb};
use crate::metrics::QueryTimer;

/// Inserts a notification, leaving an existing row with the same
/// correlation key untouched. Returns `None` on conflict.
async fn insert_if_absent(
    conn: &mut PgConnection,
    new: &NewNotification,
) -> Result<Option<NotificationEntity>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEntity>(
        r#"
        INSERT INTO notifications
            (id, recipient_id, sender_id, event_id, notification_type, message, correlation_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (correlation_key) DO NOTHING
        RETURNING id, recipient_id, sender_id, event_id, notification_type, message,
                  is_read, correlation_key, created_at
        "#,
    )
    .bind(new.id)
    .bind(new.recipient_id)
    .bind(new.sender_id)
    .bind(new.event_id)
    .bind(NotificationTypeDb::from(new.notification_type))
    .bind(&new.message)
    .bind(&new.correlation_key)
    .fetch_optional(conn)
    .await
}

/// Repository for notification-related database operations.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a notification once per correlation key.
    pub async fn insert_once(
        &self,
        new: &NewNotification,
    ) -> Result<NotificationEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_notification");
        let mut conn = self.pool.acquire().await?;
        let inserted = insert_if_absent(&mut *conn, new).await?;
        let result = match (inserted, &new.correlation_key) {
            (Some(row), _) => Ok(row),
            (None, Some(key)) => {
                sqlx::query_as::<_, NotificationEntity>(
                    r#"
                    SELECT id, recipient_id, sender_id, event_id, notification_type, message,
                           is_read, correlation_key, created_at
                    FROM notifications
                    WHERE correlation_key = $1
                    "#,
                )
                .bind(key)
                .fetch_one(&mut *conn)
                .await
            }
            // Without a key there is nothing to conflict on.
            (None, None) => Err(sqlx::Error::RowNotFound),
        };
        timer.record();
        result
    }

    /// List notifications of a recipient, newest first.
    pub async fn list_by_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_notifications_by_recipient");
        let result = sqlx::query_as::<_, NotificationEntity>(
            r#"
            SELECT id, recipient_id, sender_id, event_id, notification_type, message,
                   is_read, correlation_key, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Mark a notification read if it belongs to the recipient.
    pub async fn set_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<NotificationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("mark_notification_read");
        let result = sqlx::query_as::<_, NotificationEntity>(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE id = $1 AND recipient_id = $2
            RETURNING id, recipient_id, sender_id, event_id, notification_type, message,
                      is_read, correlation_key, created_at
            "#,
        )
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Write a join request notification and its dispatch job, unless the
    /// requester already holds an invitation to the event.
    pub async fn insert_join_request(
        &self,
        event_id: Uuid,
        requester_email: &str,
        notification: &NewNotification,
        job: &NewDispatchJob,
    ) -> Result<Result<NotificationEntity, InvitationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_join_request");
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut *tx, event_id, requester_email).await?;

        let invited = sqlx::query_as::<_, InvitationEntity>(
            r#"
            SELECT id, event_id, invitee_email, invitee_id, status, created_at, responded_at
            FROM invitations
            WHERE event_id = $1 AND invitee_email = $2
            "#,
        )
        .bind(event_id)
        .bind(requester_email)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(invitation) = invited {
            tx.rollback().await?;
            timer.record();
            return Ok(Err(invitation));
        }

        let row = insert_if_absent(&mut *tx, notification)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        insert_job(&mut *tx, job).await?;
        tx.commit().await?;
        timer.record();
        Ok(Ok(row))
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert_notification_once(&self, new: NewNotification) -> RepoResult<Notification> {
        self.insert_once(&new).await.map(Into::into).map_err(db_err)
    }

    async fn list_for_recipient(&self, recipient_id: Uuid) -> RepoResult<Vec<Notification>> {
        self.list_by_recipient(recipient_id)
            .await
            .map(|list| list.into_iter().map(Into::into).collect())
            .map_err(db_err)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> RepoResult<Option<Notification>> {
        self.set_read(notification_id, recipient_id)
            .await
            .map(|n| n.map(Into::into))
            .map_err(db_err)
    }

    async fn record_join_request(
        &self,
        event_id: Uuid,
        requester_email: &str,
        notification: NewNotification,
        job: NewDispatchJob,
    ) -> RepoResult<JoinRequestOutcome> {
        let email = shared::validation::normalize_email(requester_email);
        match self
            .insert_join_request(event_id, &email, &notification, &job)
            .await
            .map_err(db_err)?
        {
            Ok(row) => Ok(JoinRequestOutcome::Recorded(row.into())),
            Err(invitation) => Ok(JoinRequestOutcome::AlreadyInvited(invitation.into())),
        }
    }
}
