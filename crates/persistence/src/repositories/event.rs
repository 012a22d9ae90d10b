//! Event repository for database operations.

use async_trait::async_trait;
use domain::models::{Event, NewEvent};
use domain::repositories::EventRepository;
use domain::RepoResult;
use sqlx::PgPool;
use uuid::Uuid;

use super::db_err;
use crate::entities::EventEntity;
use crate::metrics::QueryTimer;

/// Repository for event-related database operations.
#[derive(Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new PgEventRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new event.
    pub async fn insert(&self, new: &NewEvent) -> Result<EventEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_event");
        let result = sqlx::query_as::<_, EventEntity>(
            r#"
            INSERT INTO events (title, description, scheduled_at, location, host_id, host_email)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, description, scheduled_at, location, host_id, host_email,
                      created_at, updated_at
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.scheduled_at)
        .bind(&new.location)
        .bind(new.host_id)
        .bind(&new.host_email)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find an event by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_event_by_id");
        let result = sqlx::query_as::<_, EventEntity>(
            r#"
            SELECT id, title, description, scheduled_at, location, host_id, host_email,
                   created_at, updated_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn create_event(&self, new: NewEvent) -> RepoResult<Event> {
        self.insert(&new).await.map(Into::into).map_err(db_err)
    }

    async fn find_event(&self, event_id: Uuid) -> RepoResult<Option<Event>> {
        self.find_by_id(event_id)
            .await
            .map(|e| e.map(Into::into))
            .map_err(db_err)
    }
}
