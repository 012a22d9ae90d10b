//! Event routes.
//!
//! Events are a thin collaborator of the invitation flow: the caller who
//! creates one becomes its host.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{CreateEventRequest, EventResponse, NewEvent};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Create an event hosted by the caller.
///
/// POST /api/v1/events
pub async fn create_event(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    request.validate()?;

    let host = user_auth.identity;
    let event = state
        .events
        .create_event(NewEvent {
            title: request.title.trim().to_string(),
            description: request.description.unwrap_or_default(),
            scheduled_at: request.scheduled_at,
            location: request.location.trim().to_string(),
            host_id: host.user_id,
            host_email: host.email.clone(),
        })
        .await?;

    info!(event_id = %event.id, host_id = %host.user_id, "Event created");

    Ok((StatusCode::CREATED, Json(event.into())))
}

/// Get an event.
///
/// GET /api/v1/events/:event_id
pub async fn get_event(
    State(state): State<AppState>,
    _user_auth: UserAuth,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state
        .events
        .find_event(event_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    Ok(Json(event.into()))
}
