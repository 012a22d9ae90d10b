//! Persistence port.
//!
//! Services talk to storage only through these traits. Every operation that
//! mutates an invitation or writes a join request also writes its dispatch
//! job, and implementations must commit both atomically.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::RepoResult;
use crate::models::{
    AttemptRecord, CorrelationKey, DeliveryAudit, DispatchJob, Event, Identity, Invitation,
    InvitationAnswer, NewDispatchJob, NewEvent, NewInvitation, NewNotification, Notification,
};

pub use memory::InMemoryStore;

/// Outcome of inserting an invitation for an (event, e-mail) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertInvitationOutcome {
    /// The invitation and its dispatch job were committed.
    Inserted(Invitation),
    /// An invitation for the pair already exists; nothing was written.
    AlreadyExists(Invitation),
}

/// Outcome of answering an invitation under its row lock.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordAnswerOutcome {
    Answered(Invitation),
    /// The invitation was answered concurrently; nothing was written.
    NotPending(Invitation),
    Missing,
}

/// Outcome of recording a join request.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRequestOutcome {
    /// The host notification and its dispatch job were committed.
    Recorded(Notification),
    /// The requester already holds an invitation; nothing was written.
    AlreadyInvited(Invitation),
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create_event(&self, new: NewEvent) -> RepoResult<Event>;

    async fn find_event(&self, event_id: Uuid) -> RepoResult<Option<Event>>;
}

/// Account holders seen through verified bearer tokens.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Upserts the identity, updating the e-mail of a known user id.
    async fn remember_identity(&self, identity: &Identity) -> RepoResult<()>;

    /// Resolves a normalized e-mail to the most recently seen account.
    async fn find_identity_by_email(&self, email: &str) -> RepoResult<Option<Identity>>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// Inserts the invitation together with its dispatch job.
    ///
    /// The (event, e-mail) pair is locked for the duration of the check and
    /// insert, so of several concurrent callers exactly one gets `Inserted`.
    async fn insert_invitation(
        &self,
        new: NewInvitation,
        job: NewDispatchJob,
    ) -> RepoResult<InsertInvitationOutcome>;

    async fn find_invitation(&self, invitation_id: Uuid) -> RepoResult<Option<Invitation>>;

    async fn find_invitation_for(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> RepoResult<Option<Invitation>>;

    /// Applies a terminal answer if the invitation is still pending, binding
    /// the responder as invitee when none is bound yet, and writes the job.
    async fn record_answer(
        &self,
        answer: InvitationAnswer,
        job: NewDispatchJob,
    ) -> RepoResult<RecordAnswerOutcome>;

    /// Invitations addressed to the e-mail, newest first.
    async fn list_invitations_for_email(&self, email: &str) -> RepoResult<Vec<Invitation>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Inserts the notification unless one with the same correlation key
    /// exists, returning whichever row is stored.
    async fn insert_notification_once(&self, new: NewNotification) -> RepoResult<Notification>;

    /// Notifications of the recipient, newest first.
    async fn list_for_recipient(&self, recipient_id: Uuid) -> RepoResult<Vec<Notification>>;

    /// Sets the read flag. Returns `None` if the notification does not
    /// belong to the recipient.
    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> RepoResult<Option<Notification>>;

    /// Writes the host notification and dispatch job of a join request,
    /// unless the requester already holds an invitation for the event.
    async fn record_join_request(
        &self,
        event_id: Uuid,
        requester_email: &str,
        notification: NewNotification,
        job: NewDispatchJob,
    ) -> RepoResult<JoinRequestOutcome>;
}

#[async_trait]
pub trait DispatchRepository: Send + Sync {
    /// Leases up to `limit` pending jobs that are due at `now` and not
    /// leased by another worker.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> RepoResult<Vec<DispatchJob>>;

    async fn find_job(&self, job_id: Uuid) -> RepoResult<Option<DispatchJob>>;

    async fn find_job_by_key(&self, key: &CorrelationKey) -> RepoResult<Option<DispatchJob>>;

    /// Stores the outcome of a delivery pass and its audit row, releasing
    /// the lease.
    ///
    /// Returns `None` without writing anything when the job has settled or
    /// was re-claimed since the pass began, i.e. `record.lease` no longer
    /// matches.
    async fn record_attempt(&self, record: AttemptRecord) -> RepoResult<Option<DispatchJob>>;

    /// Audit rows of a job, oldest first.
    async fn list_audit(&self, job_id: Uuid) -> RepoResult<Vec<DeliveryAudit>>;

    /// Deletes audit rows recorded before the cutoff.
    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64>;
}
