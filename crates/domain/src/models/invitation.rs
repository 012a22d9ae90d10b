//! Invitation domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Invitation lifecycle state. `Pending` moves exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            _ => Err(format!("Unknown invitation status: {}", s)),
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An invitation of one e-mail address to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Invitation {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Normalized e-mail, the stable correlation key for the invitee.
    pub invitee_email: String,
    /// Bound account, set at creation if known or lazily on response.
    pub invitee_id: Option<Uuid>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }
}

impl NewInvitation {
    /// Materializes the row as it will be stored.
    pub fn into_invitation(self, created_at: DateTime<Utc>) -> Invitation {
        Invitation {
            id: self.id,
            event_id: self.event_id,
            invitee_email: self.invitee_email,
            invitee_id: self.invitee_id,
            status: InvitationStatus::Pending,
            created_at,
            responded_at: None,
        }
    }
}

/// Data required to persist a new invitation.
///
/// The id is assigned up front so that the outbox job written in the same
/// transaction can reference it.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
}

/// A terminal answer applied to a pending invitation.
#[derive(Debug, Clone)]
pub struct InvitationAnswer {
    pub invitation_id: Uuid,
    pub status: InvitationStatus,
    pub responder_id: Uuid,
    pub responded_at: DateTime<Utc>,
}

/// Request to invite someone to an event.
///
/// The address is trimmed, lowercased and checked by the invitation manager,
/// so surrounding whitespace is accepted here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateInvitationRequest {
    pub invitee_email: String,
}

/// Request to answer an invitation.
///
/// The status is kept as raw JSON so that a missing, non-string or unknown
/// value surfaces as a validation error rather than a body rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RsvpRequest {
    pub status: Option<serde_json::Value>,
}

impl RsvpRequest {
    /// The answer named by the request, if it is `accepted` or `declined`.
    pub fn answer(&self) -> Option<InvitationStatus> {
        self.status
            .as_ref()?
            .as_str()?
            .parse::<InvitationStatus>()
            .ok()
            .filter(InvitationStatus::is_terminal)
    }
}

/// Invitation as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InvitationResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<Invitation> for InvitationResponse {
    fn from(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            event_id: invitation.event_id,
            invitee_email: invitation.invitee_email,
            invitee_id: invitation.invitee_id,
            status: invitation.status,
            created_at: invitation.created_at,
            responded_at: invitation.responded_at,
        }
    }
}

/// Response for listing invitations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListInvitationsResponse {
    pub data: Vec<InvitationResponse>,
}
