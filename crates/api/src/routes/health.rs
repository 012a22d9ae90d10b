//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Absent when running on the in-memory store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbox: Option<OutboxHealth>,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Outbox backlog.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct OutboxHealth {
    /// Dispatch jobs with steps still to deliver.
    pub pending_jobs: i64,
}

/// Simple status response for liveness/readiness checks.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
///
/// Returns database connectivity and the size of the dispatch backlog.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let Some(pool) = state.pool.as_ref() else {
        return Ok(Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: None,
            outbox: None,
        }));
    };

    let start = std::time::Instant::now();
    let db_connected = persistence::db::ping(pool).await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    if !db_connected {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let outbox = match persistence::metrics::record_outbox_backlog(pool).await {
        Ok(pending_jobs) => Some(OutboxHealth { pending_jobs }),
        Err(e) => {
            warn!(error = %e, "Failed to count outbox backlog");
            None
        }
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: Some(DatabaseHealth {
            connected: true,
            latency_ms: Some(latency_ms),
        }),
        outbox,
    }))
}

/// Liveness check endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness check endpoint.
///
/// Returns 200 OK if the service can accept traffic (database connected).
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if let Some(pool) = state.pool.as_ref() {
        if persistence::db::ping(pool).await.is_err() {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    Ok(Json(StatusResponse {
        status: "ready".to_string(),
    }))
}
