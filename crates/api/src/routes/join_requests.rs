//! Join request routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::NotificationResponse;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Ask the host of an event for an invitation.
///
/// POST /api/v1/events/:event_id/join-request
///
/// Returns the notification delivered to the host's inbox. The host is
/// also e-mailed asynchronously.
pub async fn request_to_join(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(event_id): Path<Uuid>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    let notification = state
        .join_requests
        .request_join(event_id, &user_auth.identity)
        .await?;

    Ok((StatusCode::CREATED, Json(notification.into())))
}
