//! Dispatch outbox repository.
//!
//! Jobs are claimed with `FOR UPDATE SKIP LOCKED` and a lease, so parallel
//! workers never hold the same job at once. A lease that runs out makes the
//! job claimable again, and the lease doubles as a fencing token: a pass
//! whose lease was taken over can no longer write its outcome.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::{AttemptRecord, CorrelationKey, DeliveryAudit, DispatchJob, NewDispatchJob};
use domain::repositories::DispatchRepository;
use domain::RepoResult;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::db_err;
use crate::entities::{
    AuditOutcomeDb, DeliveryAuditEntity, DispatchJobEntity, DispatchKindDb, DispatchStatusDb,
    StepStateDb,
};
use crate::metrics::QueryTimer;

const JOB_COLUMNS: &str = "id, correlation_key, kind, payload, status, attempts, next_attempt_at, \
     locked_until, inbox_state, email_state, last_error, created_at, updated_at";

/// Writes a job inside the caller's transaction.
pub(crate) async fn insert_job(
    conn: &mut PgConnection,
    job: &NewDispatchJob,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO dispatch_jobs (correlation_key, kind, payload, inbox_state, email_state)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(job.correlation_key.to_string())
    .bind(DispatchKindDb::from(job.correlation_key.kind))
    .bind(Json(&job.payload))
    .bind(StepStateDb::from(job.inbox_state))
    .bind(StepStateDb::from(job.email_state))
    .execute(conn)
    .await?;
    debug!(correlation_key = %job.correlation_key, "Dispatch job written to outbox");
    Ok(())
}

/// Repository for dispatch jobs and their audit trail.
#[derive(Clone)]
pub struct PgDispatchRepository {
    pool: PgPool,
}

impl PgDispatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lease due jobs for this worker.
    pub async fn claim(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<DispatchJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("claim_dispatch_jobs");
        let result = sqlx::query_as::<_, DispatchJobEntity>(&format!(
            r#"
            UPDATE dispatch_jobs
            SET locked_until = $2, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM dispatch_jobs
                WHERE status = 'pending'
                  AND next_attempt_at <= $1
                  AND (locked_until IS NULL OR locked_until <= $1)
                ORDER BY next_attempt_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(lease_until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        if let Ok(claimed) = &result {
            if !claimed.is_empty() {
                debug!(count = claimed.len(), lease_until = %lease_until, "Claimed dispatch jobs");
            }
        }
        result
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_dispatch_job_by_id");
        let result = sqlx::query_as::<_, DispatchJobEntity>(&format!(
            "SELECT {JOB_COLUMNS} FROM dispatch_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a job by correlation key.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<DispatchJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_dispatch_job_by_key");
        let result = sqlx::query_as::<_, DispatchJobEntity>(&format!(
            "SELECT {JOB_COLUMNS} FROM dispatch_jobs WHERE correlation_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Store the outcome of a delivery pass and append its audit row.
    ///
    /// The row is only updated while it is still pending under the lease the
    /// pass ran with. Otherwise nothing is written and `None` is returned.
    pub async fn update_attempt(
        &self,
        record: &AttemptRecord,
    ) -> Result<Option<DispatchJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("record_dispatch_attempt");
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, DispatchJobEntity>(&format!(
            r#"
            UPDATE dispatch_jobs
            SET attempts = $2,
                status = $3,
                inbox_state = $4,
                email_state = $5,
                next_attempt_at = $6,
                last_error = $7,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND locked_until IS NOT DISTINCT FROM $8
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(record.job_id)
        .bind(record.attempts)
        .bind(DispatchStatusDb::from(record.status))
        .bind(StepStateDb::from(record.inbox_state))
        .bind(StepStateDb::from(record.email_state))
        .bind(record.next_attempt_at)
        .bind(&record.last_error)
        .bind(record.lease)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            tx.rollback().await?;
            timer.record();
            info!(
                job_id = %record.job_id,
                attempt = record.attempts,
                "Dispatch job settled or re-claimed during the pass, outcome dropped"
            );
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO delivery_audit (job_id, correlation_key, attempt, outcome, error)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.audit.job_id)
        .bind(&record.audit.correlation_key)
        .bind(record.audit.attempt)
        .bind(AuditOutcomeDb::from(record.audit.outcome))
        .bind(&record.audit.error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(Some(job))
    }

    /// Audit rows of a job, oldest first.
    pub async fn find_audit(&self, job_id: Uuid) -> Result<Vec<DeliveryAuditEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_delivery_audit");
        let result = sqlx::query_as::<_, DeliveryAuditEntity>(
            r#"
            SELECT id, job_id, correlation_key, attempt, outcome, error, recorded_at
            FROM delivery_audit
            WHERE job_id = $1
            ORDER BY recorded_at ASC, attempt ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete audit rows older than the cutoff.
    pub async fn delete_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_old_delivery_audit");
        let result = sqlx::query(
            r#"
            DELETE FROM delivery_audit
            WHERE recorded_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await;
        timer.record();
        let deleted = result?.rows_affected();
        if deleted > 0 {
            info!(deleted = deleted, cutoff = %cutoff, "Deleted old delivery audit rows");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl DispatchRepository for PgDispatchRepository {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> RepoResult<Vec<DispatchJob>> {
        self.claim(now, limit, now + lease)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DispatchJob::try_from)
            .collect()
    }

    async fn find_job(&self, job_id: Uuid) -> RepoResult<Option<DispatchJob>> {
        self.find_by_id(job_id)
            .await
            .map_err(db_err)?
            .map(DispatchJob::try_from)
            .transpose()
    }

    async fn find_job_by_key(&self, key: &CorrelationKey) -> RepoResult<Option<DispatchJob>> {
        self.find_by_key(&key.to_string())
            .await
            .map_err(db_err)?
            .map(DispatchJob::try_from)
            .transpose()
    }

    async fn record_attempt(&self, record: AttemptRecord) -> RepoResult<Option<DispatchJob>> {
        self.update_attempt(&record)
            .await
            .map_err(db_err)?
            .map(DispatchJob::try_from)
            .transpose()
    }

    async fn list_audit(&self, job_id: Uuid) -> RepoResult<Vec<DeliveryAudit>> {
        Ok(self
            .find_audit(job_id)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DeliveryAudit::from)
            .collect())
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        self.delete_audit_before(cutoff).await.map_err(db_err)
    }
}
