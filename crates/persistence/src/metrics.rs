//! Database metrics collection.
//!
//! Query latency, pool health and the size of the dispatch outbox.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record database query duration.
///
/// Call this function after executing a query to record its duration.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Record database connection pool metrics.
///
/// Call this function periodically to track pool health.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Record how many dispatch jobs are waiting for delivery.
///
/// Call this function periodically; a growing backlog means workers are
/// falling behind or deliveries keep failing.
pub async fn record_outbox_backlog(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let timer = QueryTimer::new("count_pending_dispatch_jobs");
    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM dispatch_jobs WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    timer.record();

    gauge!("dispatch_outbox_pending").set(pending as f64);
    Ok(pending)
}

/// A helper to time database operations and record metrics.
///
/// Usage:
/// ```ignore
/// let timer = QueryTimer::new("find_invitation_by_id");
/// let result = sqlx::query_as::<_, InvitationEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    /// Create a new timer for the given query name.
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.query_name, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_creation() {
        let timer = QueryTimer::new("test_query");
        assert_eq!(timer.query_name, "test_query");
    }

    #[test]
    fn test_query_timer_with_string() {
        let name = format!("claim_{}", "dispatch_jobs");
        let timer = QueryTimer::new(name);
        assert_eq!(timer.query_name, "claim_dispatch_jobs");
        timer.record();
    }
}
