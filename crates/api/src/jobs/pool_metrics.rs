//! Background job to record connection pool and outbox metrics.

use sqlx::PgPool;

use super::scheduler::{Job, JobFrequency};

/// Job that periodically records pool health and the dispatch backlog.
pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    /// Create a new pool metrics job.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);
        persistence::metrics::record_outbox_backlog(&self.pool)
            .await
            .map_err(|e| format!("Failed to count pending dispatch jobs: {}", e))?;
        Ok(())
    }
}
