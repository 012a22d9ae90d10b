//! In-memory repositories for development and tests.
//!
//! All state lives behind one mutex, so each trait call is atomic in the
//! same way a single database transaction is.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    DispatchRepository, EventRepository, IdentityRepository, InsertInvitationOutcome,
    InvitationRepository, JoinRequestOutcome, NotificationRepository, RecordAnswerOutcome,
};
use crate::error::{RepoResult, RepositoryError};
use crate::models::{
    AttemptRecord, CorrelationKey, DeliveryAudit, DispatchJob, DispatchStatus, Event, Identity,
    Invitation, InvitationAnswer, NewDispatchJob, NewEvent, NewInvitation, NewNotification,
    Notification,
};
use shared::validation::same_email;

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    identities: Vec<Identity>,
    invitations: Vec<Invitation>,
    notifications: Vec<Notification>,
    jobs: Vec<DispatchJob>,
    audit: Vec<DeliveryAudit>,
}

impl State {
    fn push_job(&mut self, job: NewDispatchJob, now: DateTime<Utc>) -> RepoResult<()> {
        if self
            .jobs
            .iter()
            .any(|j| j.correlation_key == job.correlation_key)
        {
            return Err(RepositoryError::Database(format!(
                "duplicate dispatch job {}",
                job.correlation_key
            )));
        }
        self.jobs.push(DispatchJob {
            id: Uuid::new_v4(),
            correlation_key: job.correlation_key,
            payload: job.payload,
            status: DispatchStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            locked_until: None,
            inbox_state: job.inbox_state,
            email_state: job.email_state,
            last_error: None,
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }
}

/// Repositories backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_notification_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `insert_notification_once` fail until switched off again.
    pub fn set_fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    fn state(&self) -> RepoResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
    }

    /// Copy of all invitations, in insertion order.
    pub fn invitations(&self) -> Vec<Invitation> {
        self.state().map(|s| s.invitations.clone()).unwrap_or_default()
    }

    /// Copy of all notifications, in insertion order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state()
            .map(|s| s.notifications.clone())
            .unwrap_or_default()
    }

    /// Copy of all dispatch jobs, in insertion order.
    pub fn jobs(&self) -> Vec<DispatchJob> {
        self.state().map(|s| s.jobs.clone()).unwrap_or_default()
    }

    /// Copy of the whole delivery audit trail.
    pub fn audit(&self) -> Vec<DeliveryAudit> {
        self.state().map(|s| s.audit.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventRepository for InMemoryStore {
    async fn create_event(&self, new: NewEvent) -> RepoResult<Event> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            scheduled_at: new.scheduled_at,
            location: new.location,
            host_id: new.host_id,
            host_email: new.host_email,
            created_at: now,
            updated_at: now,
        };
        self.state()?.events.push(event.clone());
        Ok(event)
    }

    async fn find_event(&self, event_id: Uuid) -> RepoResult<Option<Event>> {
        Ok(self
            .state()?
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }
}

#[async_trait]
impl IdentityRepository for InMemoryStore {
    async fn remember_identity(&self, identity: &Identity) -> RepoResult<()> {
        let mut state = self.state()?;
        state.identities.retain(|i| i.user_id != identity.user_id);
        state.identities.push(identity.clone());
        Ok(())
    }

    async fn find_identity_by_email(&self, email: &str) -> RepoResult<Option<Identity>> {
        Ok(self
            .state()?
            .identities
            .iter()
            .rev()
            .find(|i| i.has_email(email))
            .cloned())
    }
}

#[async_trait]
impl InvitationRepository for InMemoryStore {
    async fn insert_invitation(
        &self,
        new: NewInvitation,
        job: NewDispatchJob,
    ) -> RepoResult<InsertInvitationOutcome> {
        let mut state = self.state()?;
        if let Some(existing) = state
            .invitations
            .iter()
            .find(|i| i.event_id == new.event_id && same_email(&i.invitee_email, &new.invitee_email))
        {
            return Ok(InsertInvitationOutcome::AlreadyExists(existing.clone()));
        }

        let now = Utc::now();
        let invitation = new.into_invitation(now);
        state.push_job(job, now)?;
        state.invitations.push(invitation.clone());
        Ok(InsertInvitationOutcome::Inserted(invitation))
    }

    async fn find_invitation(&self, invitation_id: Uuid) -> RepoResult<Option<Invitation>> {
        Ok(self
            .state()?
            .invitations
            .iter()
            .find(|i| i.id == invitation_id)
            .cloned())
    }

    async fn find_invitation_for(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> RepoResult<Option<Invitation>> {
        Ok(self
            .state()?
            .invitations
            .iter()
            .find(|i| i.event_id == event_id && same_email(&i.invitee_email, invitee_email))
            .cloned())
    }

    async fn record_answer(
        &self,
        answer: InvitationAnswer,
        job: NewDispatchJob,
    ) -> RepoResult<RecordAnswerOutcome> {
        let mut state = self.state()?;
        let Some(index) = state
            .invitations
            .iter()
            .position(|i| i.id == answer.invitation_id)
        else {
            return Ok(RecordAnswerOutcome::Missing);
        };

        if !state.invitations[index].is_pending() {
            return Ok(RecordAnswerOutcome::NotPending(
                state.invitations[index].clone(),
            ));
        }

        state.push_job(job, answer.responded_at)?;
        let invitation = &mut state.invitations[index];
        invitation.status = answer.status;
        invitation.responded_at = Some(answer.responded_at);
        invitation.invitee_id.get_or_insert(answer.responder_id);
        Ok(RecordAnswerOutcome::Answered(invitation.clone()))
    }

    async fn list_invitations_for_email(&self, email: &str) -> RepoResult<Vec<Invitation>> {
        let mut found: Vec<Invitation> = self
            .state()?
            .invitations
            .iter()
            .rev()
            .filter(|i| same_email(&i.invitee_email, email))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_notification_once(&self, new: NewNotification) -> RepoResult<Notification> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "notification storage offline".to_string(),
            ));
        }

        let mut state = self.state()?;
        if let Some(key) = &new.correlation_key {
            if let Some(existing) = state
                .notifications
                .iter()
                .find(|n| n.correlation_key.as_ref() == Some(key))
            {
                return Ok(existing.clone());
            }
        }

        let notification = new.into_notification(Utc::now());
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_for_recipient(&self, recipient_id: Uuid) -> RepoResult<Vec<Notification>> {
        let mut found: Vec<Notification> = self
            .state()?
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> RepoResult<Option<Notification>> {
        let mut state = self.state()?;
        Ok(state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn record_join_request(
        &self,
        event_id: Uuid,
        requester_email: &str,
        notification: NewNotification,
        job: NewDispatchJob,
    ) -> RepoResult<JoinRequestOutcome> {
        let mut state = self.state()?;
        if let Some(existing) = state
            .invitations
            .iter()
            .find(|i| i.event_id == event_id && same_email(&i.invitee_email, requester_email))
        {
            return Ok(JoinRequestOutcome::AlreadyInvited(existing.clone()));
        }

        let now = Utc::now();
        state.push_job(job, now)?;
        let notification = notification.into_notification(now);
        state.notifications.push(notification.clone());
        Ok(JoinRequestOutcome::Recorded(notification))
    }
}

#[async_trait]
impl DispatchRepository for InMemoryStore {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> RepoResult<Vec<DispatchJob>> {
        let mut state = self.state()?;
        let mut due: Vec<usize> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.status == DispatchStatus::Pending
                    && j.next_attempt_at <= now
                    && j.locked_until.map_or(true, |until| until <= now)
            })
            .map(|(index, _)| index)
            .collect();
        due.sort_by_key(|&index| state.jobs[index].next_attempt_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));

        let mut claimed = Vec::with_capacity(due.len());
        for index in due {
            let job = &mut state.jobs[index];
            job.locked_until = Some(now + lease);
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn find_job(&self, job_id: Uuid) -> RepoResult<Option<DispatchJob>> {
        Ok(self.state()?.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn find_job_by_key(&self, key: &CorrelationKey) -> RepoResult<Option<DispatchJob>> {
        Ok(self
            .state()?
            .jobs
            .iter()
            .find(|j| &j.correlation_key == key)
            .cloned())
    }

    async fn record_attempt(&self, record: AttemptRecord) -> RepoResult<Option<DispatchJob>> {
        let mut state = self.state()?;
        let now = Utc::now();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == record.job_id)
            .ok_or_else(|| {
                RepositoryError::Database(format!("dispatch job {} not found", record.job_id))
            })?;
        if job.status != DispatchStatus::Pending || job.locked_until != record.lease {
            return Ok(None);
        }

        job.attempts = record.attempts;
        job.status = record.status;
        job.inbox_state = record.inbox_state;
        job.email_state = record.email_state;
        job.next_attempt_at = record.next_attempt_at;
        job.last_error = record.last_error;
        job.locked_until = None;
        job.updated_at = now;
        let updated = job.clone();

        state.audit.push(DeliveryAudit {
            id: Uuid::new_v4(),
            job_id: record.audit.job_id,
            correlation_key: record.audit.correlation_key,
            attempt: record.audit.attempt,
            outcome: record.audit.outcome,
            error: record.audit.error,
            recorded_at: now,
        });
        Ok(Some(updated))
    }

    async fn list_audit(&self, job_id: Uuid) -> RepoResult<Vec<DeliveryAudit>> {
        Ok(self
            .state()?
            .audit
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state()?;
        let before = state.audit.len();
        state.audit.retain(|a| a.recorded_at >= cutoff);
        Ok((before - state.audit.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvitationStatus, NotificationType, StepState};

    fn new_event(host: &Identity) -> NewEvent {
        NewEvent {
            title: "Dune".to_string(),
            description: "Part two".to_string(),
            scheduled_at: Utc::now() + Duration::days(3),
            location: "Cinema".to_string(),
            host_id: host.user_id,
            host_email: host.email.clone(),
        }
    }

    fn new_invitation(event: &Event, email: &str) -> (NewInvitation, NewDispatchJob) {
        let new = NewInvitation {
            id: Uuid::new_v4(),
            event_id: event.id,
            invitee_email: email.to_string(),
            invitee_id: None,
        };
        let job = NewDispatchJob::invitation_created(&new, event);
        (new, job)
    }

    #[tokio::test]
    async fn test_insert_invitation_detects_existing_pair() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();

        let (new, job) = new_invitation(&event, "guest@example.com");
        let first = store.insert_invitation(new, job).await.unwrap();
        assert!(matches!(first, InsertInvitationOutcome::Inserted(_)));

        let (new, job) = new_invitation(&event, "guest@example.com");
        let second = store.insert_invitation(new, job).await.unwrap();
        assert!(matches!(second, InsertInvitationOutcome::AlreadyExists(_)));

        assert_eq!(store.invitations().len(), 1);
        assert_eq!(store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_record_answer_binds_identity_once() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();
        let (new, job) = new_invitation(&event, "guest@example.com");
        let InsertInvitationOutcome::Inserted(invitation) =
            store.insert_invitation(new, job).await.unwrap()
        else {
            panic!("expected insert");
        };

        let responder = Uuid::new_v4();
        let answer = InvitationAnswer {
            invitation_id: invitation.id,
            status: InvitationStatus::Accepted,
            responder_id: responder,
            responded_at: Utc::now(),
        };
        let job = NewDispatchJob::invitation_answered(
            &invitation,
            &event,
            responder,
            InvitationStatus::Accepted,
        );
        let outcome = store.record_answer(answer.clone(), job.clone()).await.unwrap();
        let RecordAnswerOutcome::Answered(answered) = outcome else {
            panic!("expected answer");
        };
        assert_eq!(answered.invitee_id, Some(responder));
        assert!(answered.responded_at.is_some());

        let again = store.record_answer(answer, job).await.unwrap();
        assert!(matches!(again, RecordAnswerOutcome::NotPending(_)));
        assert_eq!(store.jobs().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_due_respects_lease() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();
        let (new, job) = new_invitation(&event, "guest@example.com");
        store.insert_invitation(new, job).await.unwrap();

        let now = Utc::now();
        let first = store.claim_due(now, 10, Duration::seconds(60)).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = store.claim_due(now, 10, Duration::seconds(60)).await.unwrap();
        assert!(second.is_empty());

        let after_lease = now + Duration::seconds(61);
        let third = store
            .claim_due(after_lease, 10, Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_notification_once_is_idempotent() {
        let store = InMemoryStore::new();
        let recipient = Uuid::new_v4();
        let new = || NewNotification {
            id: Uuid::new_v4(),
            recipient_id: recipient,
            sender_id: None,
            event_id: None,
            notification_type: NotificationType::Invitation,
            message: "hello".to_string(),
            correlation_key: Some("invitation_created:x".to_string()),
        };

        let first = store.insert_notification_once(new()).await.unwrap();
        let second = store.insert_notification_once(new()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_for_recipient(recipient).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_checks_recipient() {
        let store = InMemoryStore::new();
        let recipient = Uuid::new_v4();
        let notification = store
            .insert_notification_once(NewNotification {
                id: Uuid::new_v4(),
                recipient_id: recipient,
                sender_id: None,
                event_id: None,
                notification_type: NotificationType::JoinRequest,
                message: "join?".to_string(),
                correlation_key: None,
            })
            .await
            .unwrap();

        let stranger = store
            .mark_read(notification.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(stranger.is_none());

        let read = store.mark_read(notification.id, recipient).await.unwrap();
        assert!(read.unwrap().is_read);
    }

    #[tokio::test]
    async fn test_record_attempt_releases_lease_and_audits() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();
        let (new, job) = new_invitation(&event, "guest@example.com");
        store.insert_invitation(new, job).await.unwrap();
        let job = store
            .claim_due(Utc::now(), 1, Duration::seconds(60))
            .await
            .unwrap()
            .remove(0);

        let updated = store
            .record_attempt(AttemptRecord {
                job_id: job.id,
                attempts: 1,
                status: DispatchStatus::Delivered,
                inbox_state: StepState::Skipped,
                email_state: StepState::Done,
                next_attempt_at: job.next_attempt_at,
                last_error: None,
                lease: job.locked_until,
                audit: crate::models::NewDeliveryAudit {
                    job_id: job.id,
                    correlation_key: job.correlation_key.to_string(),
                    attempt: 1,
                    outcome: crate::models::AuditOutcome::Delivered,
                    error: None,
                },
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, DispatchStatus::Delivered);
        assert!(updated.locked_until.is_none());
        assert_eq!(store.list_audit(job.id).await.unwrap().len(), 1);

        let purged = store
            .purge_audit_before(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }

    fn attempt(job: &DispatchJob, lease: Option<DateTime<Utc>>, status: DispatchStatus) -> AttemptRecord {
        let outcome = if status == DispatchStatus::Delivered {
            crate::models::AuditOutcome::Delivered
        } else {
            crate::models::AuditOutcome::Retrying
        };
        AttemptRecord {
            job_id: job.id,
            attempts: job.attempts + 1,
            status,
            inbox_state: StepState::Skipped,
            email_state: if status == DispatchStatus::Delivered {
                StepState::Done
            } else {
                StepState::Pending
            },
            next_attempt_at: Utc::now(),
            last_error: None,
            lease,
            audit: crate::models::NewDeliveryAudit {
                job_id: job.id,
                correlation_key: job.correlation_key.to_string(),
                attempt: job.attempts + 1,
                outcome,
                error: None,
            },
        }
    }

    #[tokio::test]
    async fn test_record_attempt_with_superseded_lease_is_dropped() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();
        let (new, job) = new_invitation(&event, "guest@example.com");
        store.insert_invitation(new, job).await.unwrap();

        let start = Utc::now();
        let first = store
            .claim_due(start, 1, Duration::milliseconds(10))
            .await
            .unwrap()
            .remove(0);
        // The first lease has expired; a second worker takes the job over.
        let second = store
            .claim_due(start + Duration::seconds(1), 1, Duration::seconds(60))
            .await
            .unwrap()
            .remove(0);
        assert_ne!(first.locked_until, second.locked_until);

        let delivered = store
            .record_attempt(attempt(&second, second.locked_until, DispatchStatus::Delivered))
            .await
            .unwrap();
        assert!(delivered.is_some());

        let stale = store
            .record_attempt(attempt(&first, first.locked_until, DispatchStatus::Pending))
            .await
            .unwrap();
        assert!(stale.is_none());

        let job = store.find_job(first.id).await.unwrap().unwrap();
        assert_eq!(job.status, DispatchStatus::Delivered);
        assert_eq!(job.email_state, StepState::Done);
        assert_eq!(job.attempts, 1);
        assert_eq!(store.list_audit(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_attempt_under_expired_lease_still_wins_when_unclaimed() {
        let store = InMemoryStore::new();
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store.create_event(new_event(&host)).await.unwrap();
        let (new, job) = new_invitation(&event, "guest@example.com");
        store.insert_invitation(new, job).await.unwrap();

        let claimed = store
            .claim_due(Utc::now(), 1, Duration::milliseconds(1))
            .await
            .unwrap()
            .remove(0);

        // Nobody re-claimed the job, so the slow pass is still the latest.
        let recorded = store
            .record_attempt(attempt(&claimed, claimed.locked_until, DispatchStatus::Pending))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.status, DispatchStatus::Pending);
        assert!(recorded.locked_until.is_none());
    }
}
