//! Identity repository for database operations.

use async_trait::async_trait;
use domain::models::Identity;
use domain::repositories::IdentityRepository;
use domain::RepoResult;
use sqlx::PgPool;
use uuid::Uuid;

use super::db_err;
use crate::entities::IdentityEntity;
use crate::metrics::QueryTimer;

/// Repository for identities seen through verified tokens.
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh an identity.
    pub async fn upsert(&self, user_id: Uuid, email: &str) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_identity");
        let result = sqlx::query(
            r#"
            INSERT INTO identities (user_id, email, last_seen_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET email = EXCLUDED.email, last_seen_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(email)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Find the most recently seen identity for an e-mail.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<IdentityEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_identity_by_email");
        let result = sqlx::query_as::<_, IdentityEntity>(
            r#"
            SELECT user_id, email, last_seen_at
            FROM identities
            WHERE email = $1
            ORDER BY last_seen_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn remember_identity(&self, identity: &Identity) -> RepoResult<()> {
        self.upsert(identity.user_id, &identity.email)
            .await
            .map_err(db_err)
    }

    async fn find_identity_by_email(&self, email: &str) -> RepoResult<Option<Identity>> {
        let email = shared::validation::normalize_email(email);
        self.find_by_email(&email)
            .await
            .map(|e| e.map(Into::into))
            .map_err(db_err)
    }
}
