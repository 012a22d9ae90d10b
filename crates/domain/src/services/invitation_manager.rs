//! Invitation lifecycle.
//!
//! Creating and answering an invitation each commit the state change and
//! its outbox job together; workers are only signalled after the commit.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, Instrument, Span};
use uuid::Uuid;

use super::dispatcher::{enqueue_after_commit, DispatchQueue};
use crate::error::{ConflictReason, DomainError, DomainResult};
use crate::models::{
    Event, Identity, Invitation, InvitationAnswer, InvitationStatus, NewDispatchJob,
    NewInvitation,
};
use crate::repositories::{
    EventRepository, IdentityRepository, InsertInvitationOutcome, InvitationRepository,
    RecordAnswerOutcome,
};
use shared::validation::{normalize_email, same_email, validate_email_address};

pub struct InvitationManager {
    events: Arc<dyn EventRepository>,
    identities: Arc<dyn IdentityRepository>,
    invitations: Arc<dyn InvitationRepository>,
    queue: Arc<dyn DispatchQueue>,
    span: Span,
}

impl InvitationManager {
    pub fn new(
        events: Arc<dyn EventRepository>,
        identities: Arc<dyn IdentityRepository>,
        invitations: Arc<dyn InvitationRepository>,
        queue: Arc<dyn DispatchQueue>,
    ) -> Self {
        Self {
            events,
            identities,
            invitations,
            queue,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Invites an e-mail address to the requester's event.
    ///
    /// Any existing invitation for the address blocks a new one, whatever
    /// its status.
    pub async fn create(
        &self,
        event_id: Uuid,
        requester: &Identity,
        invitee_email: &str,
    ) -> DomainResult<Invitation> {
        let span = tracing::info_span!(
            parent: &self.span,
            "create_invitation",
            event_id = %event_id,
            requester = %requester.user_id
        );
        self.create_inner(event_id, requester, invitee_email)
            .instrument(span)
            .await
    }

    async fn create_inner(
        &self,
        event_id: Uuid,
        requester: &Identity,
        invitee_email: &str,
    ) -> DomainResult<Invitation> {
        let event = self.load_event(event_id).await?;

        if !event.is_host(requester.user_id) {
            return Err(DomainError::Forbidden(
                "Only the event host can send invitations".to_string(),
            ));
        }

        validate_email_address(invitee_email)
            .map_err(|_| DomainError::Validation("Invalid email address".to_string()))?;
        let invitee_email = normalize_email(invitee_email);
        if same_email(&invitee_email, &event.host_email) {
            return Err(DomainError::Validation(
                "You cannot invite yourself".to_string(),
            ));
        }

        let invitee_id = self
            .identities
            .find_identity_by_email(&invitee_email)
            .await?
            .map(|identity| identity.user_id);

        let new = NewInvitation {
            id: Uuid::new_v4(),
            event_id: event.id,
            invitee_email,
            invitee_id,
        };
        let job = NewDispatchJob::invitation_created(&new, &event);
        let key = job.correlation_key;

        let invitation = match self.invitations.insert_invitation(new, job).await? {
            InsertInvitationOutcome::Inserted(invitation) => invitation,
            InsertInvitationOutcome::AlreadyExists(existing) => {
                info!(
                    invitation_id = %existing.id,
                    status = %existing.status,
                    "Duplicate invitation rejected"
                );
                return Err(ConflictReason::DuplicateInvitation(existing.status).into());
            }
        };

        enqueue_after_commit(self.queue.as_ref(), &key);
        metrics::counter!("invitations_created_total").increment(1);
        info!(
            invitation_id = %invitation.id,
            invitee_registered = invitation.invitee_id.is_some(),
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Answers a pending invitation on behalf of its invitee.
    pub async fn respond(
        &self,
        invitation_id: Uuid,
        responder: &Identity,
        new_status: InvitationStatus,
    ) -> DomainResult<Invitation> {
        let span = tracing::info_span!(
            parent: &self.span,
            "respond_invitation",
            invitation_id = %invitation_id,
            responder = %responder.user_id
        );
        self.respond_inner(invitation_id, responder, new_status)
            .instrument(span)
            .await
    }

    async fn respond_inner(
        &self,
        invitation_id: Uuid,
        responder: &Identity,
        new_status: InvitationStatus,
    ) -> DomainResult<Invitation> {
        if !new_status.is_terminal() {
            return Err(DomainError::Validation(
                "Status must be 'accepted' or 'declined'".to_string(),
            ));
        }

        let invitation = self
            .invitations
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Invitation not found".to_string()))?;
        let event = self.load_event(invitation.event_id).await?;

        if !responder.has_email(&invitation.invitee_email) {
            return Err(DomainError::Forbidden(
                "This invitation is addressed to someone else".to_string(),
            ));
        }
        if event.is_host(responder.user_id) || responder.has_email(&event.host_email) {
            return Err(DomainError::Forbidden(
                "The host cannot respond to an invitation to their own event".to_string(),
            ));
        }
        if invitation
            .invitee_id
            .is_some_and(|bound| bound != responder.user_id)
        {
            return Err(DomainError::Forbidden(
                "This invitation is bound to another account".to_string(),
            ));
        }
        if !invitation.is_pending() {
            return Err(ConflictReason::AlreadyAnswered(invitation.status).into());
        }

        let answer = InvitationAnswer {
            invitation_id,
            status: new_status,
            responder_id: responder.user_id,
            responded_at: Utc::now(),
        };
        let job = NewDispatchJob::invitation_answered(
            &invitation,
            &event,
            responder.user_id,
            new_status,
        );
        let key = job.correlation_key;

        let answered = match self.invitations.record_answer(answer, job).await? {
            RecordAnswerOutcome::Answered(answered) => answered,
            RecordAnswerOutcome::NotPending(current) => {
                info!(status = %current.status, "Invitation answered concurrently");
                return Err(ConflictReason::AlreadyAnswered(current.status).into());
            }
            RecordAnswerOutcome::Missing => {
                return Err(DomainError::NotFound("Invitation not found".to_string()))
            }
        };

        enqueue_after_commit(self.queue.as_ref(), &key);
        metrics::counter!("invitations_answered_total", "status" => new_status.as_str())
            .increment(1);
        info!(status = %answered.status, "Invitation answered");
        Ok(answered)
    }

    /// Invitations addressed to the identity's e-mail, newest first.
    pub async fn list_for(&self, identity: &Identity) -> DomainResult<Vec<Invitation>> {
        Ok(self
            .invitations
            .list_invitations_for_email(&identity.email)
            .await?)
    }

    async fn load_event(&self, event_id: Uuid) -> DomainResult<Event> {
        self.events
            .find_event(event_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Event not found".to_string()))
    }
}
