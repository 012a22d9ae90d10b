//! Dispatch outbox models.
//!
//! A dispatch job is written in the same transaction as the mutation that
//! triggers it and is later consumed by the dispatcher. Each job carries
//! everything needed to render its messages, so delivery never depends on
//! re-reading the triggering rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{Event, Identity, Invitation, InvitationStatus, NewInvitation};

/// Triggering domain event of a dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    InvitationCreated,
    InvitationAnswered,
    JoinRequested,
}

impl DispatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchKind::InvitationCreated => "invitation_created",
            DispatchKind::InvitationAnswered => "invitation_answered",
            DispatchKind::JoinRequested => "join_requested",
        }
    }
}

impl FromStr for DispatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation_created" => Ok(DispatchKind::InvitationCreated),
            "invitation_answered" => Ok(DispatchKind::InvitationAnswered),
            "join_requested" => Ok(DispatchKind::JoinRequested),
            _ => Err(format!("Unknown dispatch kind: {}", s)),
        }
    }
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique key of a dispatch job, rendered as `<kind>:<subject>`.
///
/// The subject is the invitation id for invitation jobs and the join-request
/// notification id for join requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub kind: DispatchKind,
    pub subject: Uuid,
}

impl CorrelationKey {
    pub fn new(kind: DispatchKind, subject: Uuid) -> Self {
        Self { kind, subject }
    }
}

impl std::fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.subject)
    }
}

impl FromStr for CorrelationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, subject) = s
            .split_once(':')
            .ok_or_else(|| format!("Malformed correlation key: {}", s))?;
        let subject = Uuid::parse_str(subject)
            .map_err(|_| format!("Malformed correlation key: {}", s))?;
        Ok(Self {
            kind: kind.parse()?,
            subject,
        })
    }
}

impl Serialize for CorrelationKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CorrelationKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Overall state of a dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Delivered,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Delivered => "delivered",
            DispatchStatus::Failed => "failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, DispatchStatus::Pending)
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of one delivery step (inbox write or e-mail send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not yet completed; retried on the next pass.
    Pending,
    Done,
    /// Nothing to do, e.g. the invitee has no account yet.
    Skipped,
    /// Given up after a permanent failure or exhausted attempts.
    Abandoned,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Done => "done",
            StepState::Skipped => "skipped",
            StepState::Abandoned => "abandoned",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, StepState::Pending)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event details captured for message rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub host_id: Uuid,
    pub host_email: String,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            title: event.title.clone(),
            description: event.description.clone(),
            scheduled_at: event.scheduled_at,
            location: event.location.clone(),
            host_id: event.host_id,
            host_email: event.host_email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationCreatedPayload {
    pub invitation_id: Uuid,
    pub invitee_email: String,
    pub event: EventSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationAnsweredPayload {
    pub invitation_id: Uuid,
    pub invitee_email: String,
    pub responder_id: Uuid,
    pub status: InvitationStatus,
    pub event: EventSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequestedPayload {
    pub request_id: Uuid,
    pub requester_id: Uuid,
    pub requester_email: String,
    pub event: EventSummary,
}

/// Template inputs of a dispatch job, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchPayload {
    InvitationCreated(InvitationCreatedPayload),
    InvitationAnswered(InvitationAnsweredPayload),
    JoinRequested(JoinRequestedPayload),
}

impl DispatchPayload {
    pub fn kind(&self) -> DispatchKind {
        match self {
            DispatchPayload::InvitationCreated(_) => DispatchKind::InvitationCreated,
            DispatchPayload::InvitationAnswered(_) => DispatchKind::InvitationAnswered,
            DispatchPayload::JoinRequested(_) => DispatchKind::JoinRequested,
        }
    }

    pub fn event(&self) -> &EventSummary {
        match self {
            DispatchPayload::InvitationCreated(p) => &p.event,
            DispatchPayload::InvitationAnswered(p) => &p.event,
            DispatchPayload::JoinRequested(p) => &p.event,
        }
    }

    /// Address the e-mail step is sent to.
    pub fn recipient_email(&self) -> &str {
        match self {
            DispatchPayload::InvitationCreated(p) => &p.invitee_email,
            DispatchPayload::InvitationAnswered(p) => &p.event.host_email,
            DispatchPayload::JoinRequested(p) => &p.event.host_email,
        }
    }
}

/// A dispatch job ready to be written to the outbox.
#[derive(Debug, Clone)]
pub struct NewDispatchJob {
    pub correlation_key: CorrelationKey,
    pub payload: DispatchPayload,
    pub inbox_state: StepState,
    pub email_state: StepState,
}

impl NewDispatchJob {
    /// Tells the invitee about a new invitation.
    pub fn invitation_created(invitation: &NewInvitation, event: &Event) -> Self {
        Self {
            correlation_key: CorrelationKey::new(DispatchKind::InvitationCreated, invitation.id),
            payload: DispatchPayload::InvitationCreated(InvitationCreatedPayload {
                invitation_id: invitation.id,
                invitee_email: invitation.invitee_email.clone(),
                event: event.into(),
            }),
            inbox_state: StepState::Pending,
            email_state: StepState::Pending,
        }
    }

    /// Tells the host how an invitee answered.
    pub fn invitation_answered(
        invitation: &Invitation,
        event: &Event,
        responder_id: Uuid,
        status: InvitationStatus,
    ) -> Self {
        Self {
            correlation_key: CorrelationKey::new(DispatchKind::InvitationAnswered, invitation.id),
            payload: DispatchPayload::InvitationAnswered(InvitationAnsweredPayload {
                invitation_id: invitation.id,
                invitee_email: invitation.invitee_email.clone(),
                responder_id,
                status,
                event: event.into(),
            }),
            inbox_state: StepState::Pending,
            email_state: StepState::Pending,
        }
    }

    /// E-mails the host about a join request.
    ///
    /// The inbox notification is written synchronously with the request, so
    /// the inbox step starts out done.
    pub fn join_requested(request_id: Uuid, event: &Event, requester: &Identity) -> Self {
        Self {
            correlation_key: CorrelationKey::new(DispatchKind::JoinRequested, request_id),
            payload: DispatchPayload::JoinRequested(JoinRequestedPayload {
                request_id,
                requester_id: requester.user_id,
                requester_email: requester.email.clone(),
                event: event.into(),
            }),
            inbox_state: StepState::Done,
            email_state: StepState::Pending,
        }
    }
}

/// A dispatch job as stored in the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchJob {
    pub id: Uuid,
    pub correlation_key: CorrelationKey,
    pub payload: DispatchPayload,
    pub status: DispatchStatus,
    /// Number of delivery passes made so far.
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub inbox_state: StepState,
    pub email_state: StepState,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchJob {
    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }
}

/// Result of one delivery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Delivered,
    Retrying,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Delivered => "delivered",
            AuditOutcome::Retrying => "retrying",
            AuditOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the delivery audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAudit {
    pub id: Uuid,
    pub job_id: Uuid,
    pub correlation_key: String,
    pub attempt: i32,
    pub outcome: AuditOutcome,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryAudit {
    pub job_id: Uuid,
    pub correlation_key: String,
    pub attempt: i32,
    pub outcome: AuditOutcome,
    pub error: Option<String>,
}

/// Job state written back after a delivery pass, together with its audit row.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub job_id: Uuid,
    pub attempts: i32,
    pub status: DispatchStatus,
    pub inbox_state: StepState,
    pub email_state: StepState,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Lease the pass ran under. The write is dropped when the job is no
    /// longer pending under this lease.
    pub lease: Option<DateTime<Utc>>,
    pub audit: NewDeliveryAudit,
}
