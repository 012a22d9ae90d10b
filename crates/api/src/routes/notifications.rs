//! In-app notification routes.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::{ListNotificationsResponse, NotificationResponse};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// List the caller's notifications, newest first.
///
/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let notifications = state
        .notifications
        .list_for_recipient(user_auth.identity.user_id)
        .await?;

    Ok(Json(ListNotificationsResponse::from_notifications(
        notifications,
    )))
}

/// Mark one of the caller's notifications as read.
///
/// PUT /api/v1/notifications/:notification_id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let notification = state
        .notifications
        .mark_read(notification_id, user_auth.identity.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(Json(notification.into()))
}
