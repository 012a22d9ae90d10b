//! Invitation routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateInvitationRequest, InvitationResponse, ListInvitationsResponse, RsvpRequest,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Invite an e-mail address to an event.
///
/// POST /api/v1/events/:event_id/invitations
///
/// Only the event host may invite. At most one invitation exists per
/// (event, e-mail); a second attempt is rejected with 409 whatever the
/// status of the first.
pub async fn create_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiError> {
    let invitation = state
        .invitations
        .create(event_id, &user_auth.identity, &request.invitee_email)
        .await?;

    Ok((StatusCode::CREATED, Json(invitation.into())))
}

/// Accept or decline an invitation.
///
/// PUT /api/v1/invitations/:invitation_id/rsvp
pub async fn respond_to_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(invitation_id): Path<Uuid>,
    Json(request): Json<RsvpRequest>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let status = request.answer().ok_or_else(|| {
        ApiError::Validation("Status must be 'accepted' or 'declined'".to_string())
    })?;

    let invitation = state
        .invitations
        .respond(invitation_id, &user_auth.identity, status)
        .await?;

    Ok(Json(invitation.into()))
}

/// List invitations addressed to the caller's e-mail.
///
/// GET /api/v1/invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<ListInvitationsResponse>, ApiError> {
    let invitations = state.invitations.list_for(&user_auth.identity).await?;

    Ok(Json(ListInvitationsResponse {
        data: invitations.into_iter().map(Into::into).collect(),
    }))
}
