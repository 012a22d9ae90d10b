//! Notification dispatcher.
//!
//! Consumes outbox jobs: writes the in-app notification, sends the e-mail,
//! and settles the job. Each step is tracked separately so that a failing
//! step is retried without repeating one that already succeeded.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use super::mail::{MailError, MailTransport};
use super::retry::RetryPolicy;
use super::templates::MessageTemplates;
use crate::error::RepoResult;
use crate::models::{
    AttemptRecord, AuditOutcome, CorrelationKey, DispatchJob, DispatchPayload, DispatchStatus,
    Identity, NewDeliveryAudit, NewNotification, NotificationType, StepState,
};
use crate::repositories::{DispatchRepository, IdentityRepository, NotificationRepository};

/// Failure to signal the worker pool.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Dispatch queue is closed")]
    Closed,

    #[error("Dispatch queue unavailable: {0}")]
    Unavailable(String),
}

/// Wakes dispatch workers for a job that is already durable in the outbox.
pub trait DispatchQueue: Send + Sync {
    fn enqueue(&self, key: &CorrelationKey) -> Result<(), EnqueueError>;
}

/// Signals the queue after a commit. A failed signal only delays delivery
/// until the next poll, so it is logged and swallowed.
pub fn enqueue_after_commit(queue: &dyn DispatchQueue, key: &CorrelationKey) {
    match queue.enqueue(key) {
        Ok(()) => debug!(correlation_key = %key, "Dispatch job enqueued"),
        Err(e) => warn!(
            correlation_key = %key,
            error = %e,
            "Failed to signal dispatch queue, job will be picked up by polling"
        ),
    }
}

/// Queue for tests that records every signal.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    keys: Mutex<Vec<CorrelationKey>>,
    closed: AtomicBool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `enqueue` fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<CorrelationKey> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

impl DispatchQueue for RecordingQueue {
    fn enqueue(&self, key: &CorrelationKey) -> Result<(), EnqueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EnqueueError::Closed);
        }
        self.keys
            .lock()
            .map_err(|_| EnqueueError::Unavailable("poisoned".to_string()))?
            .push(*key);
        Ok(())
    }
}

/// Tunables of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub retry: RetryPolicy,
    /// Upper bound on a single mail transport call.
    pub attempt_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one `deliver` call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The job was already delivered or failed; nothing was done.
    AlreadySettled,
    /// The job no longer exists.
    Missing,
    /// The pass was recorded and left the job in this state.
    Recorded(DispatchJob),
    /// Another worker took the job over while this pass ran; its result was
    /// discarded.
    Superseded,
}

impl DeliveryOutcome {
    pub fn status(&self) -> Option<DispatchStatus> {
        match self {
            DeliveryOutcome::Recorded(job) => Some(job.status),
            _ => None,
        }
    }
}

/// Delivers outbox jobs.
pub struct Dispatcher {
    jobs: Arc<dyn DispatchRepository>,
    notifications: Arc<dyn NotificationRepository>,
    identities: Arc<dyn IdentityRepository>,
    mail: Arc<dyn MailTransport>,
    templates: MessageTemplates,
    settings: DispatcherSettings,
    span: Span,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<dyn DispatchRepository>,
        notifications: Arc<dyn NotificationRepository>,
        identities: Arc<dyn IdentityRepository>,
        mail: Arc<dyn MailTransport>,
        templates: MessageTemplates,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            jobs,
            notifications,
            identities,
            mail,
            templates,
            settings,
            span: Span::none(),
        }
    }

    /// Emits this component's events under the given span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &Arc<dyn DispatchRepository> {
        &self.jobs
    }

    /// Runs one delivery pass for the job.
    ///
    /// The job is re-read first, so a stale or duplicate claim of a job that
    /// has meanwhile settled is a no-op. Errors are returned only when the
    /// outcome itself could not be stored.
    pub async fn deliver(&self, job_id: Uuid) -> RepoResult<DeliveryOutcome> {
        let span = tracing::info_span!(parent: &self.span, "deliver", job_id = %job_id);
        self.reload_and_deliver(job_id).instrument(span).await
    }

    async fn reload_and_deliver(&self, job_id: Uuid) -> RepoResult<DeliveryOutcome> {
        let Some(job) = self.jobs.find_job(job_id).await? else {
            warn!("Dispatch job vanished before delivery");
            return Ok(DeliveryOutcome::Missing);
        };
        self.deliver_job(job).await
    }

    /// Claims and delivers due jobs, up to `limit`.
    ///
    /// Jobs are claimed one at a time so every lease starts when its own pass
    /// does, however long the earlier passes took.
    pub async fn deliver_due(&self, limit: i64, lease: chrono::Duration) -> RepoResult<usize> {
        let mut count: usize = 0;
        while (count as i64) < limit {
            let Some(job) = self.jobs.claim_due(Utc::now(), 1, lease).await?.pop() else {
                break;
            };
            count += 1;
            let job_id = job.id;
            let span = tracing::info_span!(parent: &self.span, "deliver", job_id = %job_id);
            if let Err(e) = self.deliver_job(job).instrument(span).await {
                warn!(parent: &self.span, job_id = %job_id, error = %e, "Failed to record delivery attempt");
            }
        }
        Ok(count)
    }

    /// One pass over a job as last read or claimed. Its `locked_until` is
    /// the lease the outcome is recorded under.
    async fn deliver_job(&self, job: DispatchJob) -> RepoResult<DeliveryOutcome> {
        if job.is_settled() {
            debug!(status = %job.status, "Dispatch job already settled");
            return Ok(DeliveryOutcome::AlreadySettled);
        }

        let attempt = job.attempts + 1;
        let mut inbox_state = job.inbox_state;
        let mut email_state = job.email_state;
        let mut errors: Vec<String> = Vec::new();

        let invitee = self.resolve_invitee(&job).await;

        if inbox_state == StepState::Pending {
            match self.write_inbox(&job, &invitee).await {
                Ok(state) => inbox_state = state,
                Err(e) => {
                    warn!(error = %e, "Inbox write failed");
                    errors.push(format!("inbox: {}", e));
                }
            }
        }

        if email_state == StepState::Pending {
            // Which message to send depends on the lookup, so it waits too.
            if let Some(Err(e)) = &invitee {
                info!(error = %e, "Invitee lookup failed, e-mail deferred");
                errors.push(format!("email: invitee lookup failed: {}", e));
            } else {
                let registered = matches!(invitee, Some(Ok(Some(_))));
                match self.send_email(&job.payload, registered).await {
                    Ok(()) => email_state = StepState::Done,
                    Err(MailError::Permanent(reason)) => {
                        warn!(reason = %reason, "E-mail permanently rejected");
                        email_state = StepState::Abandoned;
                        errors.push(format!("email: {}", reason));
                    }
                    Err(MailError::Transient(reason)) => {
                        info!(reason = %reason, "E-mail send failed, will retry");
                        errors.push(format!("email: {}", reason));
                    }
                }
            }
        }

        let now = Utc::now();
        let finished = inbox_state.is_finished() && email_state.is_finished();
        let (status, outcome, next_attempt_at) = if finished {
            if inbox_state == StepState::Abandoned || email_state == StepState::Abandoned {
                (DispatchStatus::Failed, AuditOutcome::Failed, now)
            } else {
                (DispatchStatus::Delivered, AuditOutcome::Delivered, now)
            }
        } else if self
            .settings
            .retry
            .is_exhausted(u32::try_from(attempt).unwrap_or(u32::MAX))
        {
            if inbox_state == StepState::Pending {
                inbox_state = StepState::Abandoned;
            }
            if email_state == StepState::Pending {
                email_state = StepState::Abandoned;
            }
            (DispatchStatus::Failed, AuditOutcome::Failed, now)
        } else {
            let delay = self
                .settings
                .retry
                .backoff(u32::try_from(attempt).unwrap_or(u32::MAX));
            let delay = chrono::Duration::from_std(delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
            (DispatchStatus::Pending, AuditOutcome::Retrying, now + delay)
        };

        let last_error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        let record = AttemptRecord {
            job_id: job.id,
            attempts: attempt,
            status,
            inbox_state,
            email_state,
            next_attempt_at,
            last_error: last_error.clone(),
            lease: job.locked_until,
            audit: NewDeliveryAudit {
                job_id: job.id,
                correlation_key: job.correlation_key.to_string(),
                attempt,
                outcome,
                error: last_error,
            },
        };
        let Some(updated) = self.jobs.record_attempt(record).await? else {
            info!(
                correlation_key = %job.correlation_key,
                attempt,
                "Dispatch job was taken over by another worker, discarding this pass"
            );
            return Ok(DeliveryOutcome::Superseded);
        };

        metrics::counter!(
            "dispatch_attempts_total",
            "kind" => job.correlation_key.kind.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        match outcome {
            AuditOutcome::Delivered => info!(
                correlation_key = %job.correlation_key,
                attempt,
                "Dispatch job delivered"
            ),
            AuditOutcome::Retrying => info!(
                correlation_key = %job.correlation_key,
                attempt,
                next_attempt_at = %next_attempt_at,
                "Dispatch job scheduled for retry"
            ),
            AuditOutcome::Failed => warn!(
                correlation_key = %job.correlation_key,
                attempt,
                inbox = %inbox_state,
                email = %email_state,
                "Dispatch job failed"
            ),
        }

        Ok(DeliveryOutcome::Recorded(updated))
    }

    /// Looks up the account behind an invitee address. Only invitation jobs
    /// address someone who may not have an account.
    async fn resolve_invitee(&self, job: &DispatchJob) -> Option<RepoResult<Option<Identity>>> {
        match &job.payload {
            DispatchPayload::InvitationCreated(p)
                if !(job.inbox_state.is_finished() && job.email_state.is_finished()) =>
            {
                Some(self.identities.find_identity_by_email(&p.invitee_email).await)
            }
            _ => None,
        }
    }

    async fn write_inbox(
        &self,
        job: &DispatchJob,
        invitee: &Option<RepoResult<Option<Identity>>>,
    ) -> RepoResult<StepState> {
        let (recipient_id, sender_id, notification_type) = match &job.payload {
            DispatchPayload::InvitationCreated(p) => match invitee {
                Some(Ok(Some(identity))) => (
                    identity.user_id,
                    Some(p.event.host_id),
                    NotificationType::Invitation,
                ),
                Some(Ok(None)) | None => {
                    debug!("Invitee has no account yet, skipping inbox notification");
                    return Ok(StepState::Skipped);
                }
                Some(Err(e)) => {
                    return Err(crate::error::RepositoryError::Unavailable(format!(
                        "identity lookup failed: {}",
                        e
                    )))
                }
            },
            DispatchPayload::InvitationAnswered(p) => (
                p.event.host_id,
                Some(p.responder_id),
                NotificationType::Invitation,
            ),
            DispatchPayload::JoinRequested(p) => (
                p.event.host_id,
                Some(p.requester_id),
                NotificationType::JoinRequest,
            ),
        };

        let notification = self
            .notifications
            .insert_notification_once(NewNotification {
                id: Uuid::new_v4(),
                recipient_id,
                sender_id,
                event_id: Some(job.payload.event().event_id),
                notification_type,
                message: self.templates.inbox_message(&job.payload),
                correlation_key: Some(job.correlation_key.to_string()),
            })
            .await?;
        debug!(notification_id = %notification.id, "Inbox notification stored");
        Ok(StepState::Done)
    }

    async fn send_email(&self, payload: &DispatchPayload, registered: bool) -> Result<(), MailError> {
        let message = self.templates.email(payload, registered);
        match tokio::time::timeout(self.settings.attempt_timeout, self.mail.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Transient(format!(
                "send timed out after {}ms",
                self.settings.attempt_timeout.as_millis()
            ))),
        }
    }
}
