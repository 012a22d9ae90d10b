//! Join requests: someone without an invitation asks the host for one.

use std::sync::Arc;
use tracing::{info, Instrument, Span};
use uuid::Uuid;

use super::dispatcher::{enqueue_after_commit, DispatchQueue};
use super::templates::MessageTemplates;
use crate::error::{ConflictReason, DomainError, DomainResult};
use crate::models::{Identity, NewDispatchJob, NewNotification, Notification, NotificationType};
use crate::repositories::{EventRepository, JoinRequestOutcome, NotificationRepository};

pub struct JoinRequestHandler {
    events: Arc<dyn EventRepository>,
    notifications: Arc<dyn NotificationRepository>,
    queue: Arc<dyn DispatchQueue>,
    templates: MessageTemplates,
    span: Span,
}

impl JoinRequestHandler {
    pub fn new(
        events: Arc<dyn EventRepository>,
        notifications: Arc<dyn NotificationRepository>,
        queue: Arc<dyn DispatchQueue>,
        templates: MessageTemplates,
    ) -> Self {
        Self {
            events,
            notifications,
            queue,
            templates,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Notifies the host that `requester` would like to be invited.
    ///
    /// The inbox notification is written right away; the e-mail to the host
    /// goes through the outbox. No invitation is created.
    pub async fn request_join(
        &self,
        event_id: Uuid,
        requester: &Identity,
    ) -> DomainResult<Notification> {
        let span = tracing::info_span!(
            parent: &self.span,
            "request_join",
            event_id = %event_id,
            requester = %requester.user_id
        );
        self.request_join_inner(event_id, requester)
            .instrument(span)
            .await
    }

    async fn request_join_inner(
        &self,
        event_id: Uuid,
        requester: &Identity,
    ) -> DomainResult<Notification> {
        let event = self
            .events
            .find_event(event_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Event not found".to_string()))?;

        if event.is_host(requester.user_id) || requester.has_email(&event.host_email) {
            return Err(ConflictReason::SelfJoinRequest.into());
        }

        let request_id = Uuid::new_v4();
        let job = NewDispatchJob::join_requested(request_id, &event, requester);
        let key = job.correlation_key;
        let notification = NewNotification {
            id: request_id,
            recipient_id: event.host_id,
            sender_id: Some(requester.user_id),
            event_id: Some(event.id),
            notification_type: NotificationType::JoinRequest,
            message: self.templates.inbox_message(&job.payload),
            correlation_key: Some(key.to_string()),
        };

        let notification = match self
            .notifications
            .record_join_request(event.id, &requester.email, notification, job)
            .await?
        {
            JoinRequestOutcome::Recorded(notification) => notification,
            JoinRequestOutcome::AlreadyInvited(invitation) => {
                info!(
                    invitation_id = %invitation.id,
                    status = %invitation.status,
                    "Join request from existing invitee rejected"
                );
                return Err(ConflictReason::AlreadyInvited(invitation.status).into());
            }
        };

        enqueue_after_commit(self.queue.as_ref(), &key);
        metrics::counter!("join_requests_total").increment(1);
        info!(notification_id = %notification.id, "Join request recorded");
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispatchKind, Event, InvitationStatus, NewEvent, StepState};
    use crate::repositories::InMemoryStore;
    use crate::services::dispatcher::RecordingQueue;
    use crate::services::invitation_manager::InvitationManager;
    use chrono::Utc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        queue: Arc<RecordingQueue>,
        handler: JoinRequestHandler,
        manager: InvitationManager,
        host: Identity,
        event: Event,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::new());
        let handler = JoinRequestHandler::new(
            store.clone(),
            store.clone(),
            queue.clone(),
            MessageTemplates::default(),
        );
        let manager =
            InvitationManager::new(store.clone(), store.clone(), store.clone(), queue.clone());
        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store
            .create_event(NewEvent {
                title: "Dune".to_string(),
                description: String::new(),
                scheduled_at: Utc::now(),
                location: "Cinema".to_string(),
                host_id: host.user_id,
                host_email: host.email.clone(),
            })
            .await
            .unwrap();
        Fixture {
            store,
            queue,
            handler,
            manager,
            host,
            event,
        }
    }

    #[tokio::test]
    async fn test_join_request_notifies_host() {
        let f = fixture().await;
        let fan = Identity::new(Uuid::new_v4(), "fan@example.com");

        let notification = f.handler.request_join(f.event.id, &fan).await.unwrap();
        assert_eq!(notification.recipient_id, f.host.user_id);
        assert_eq!(notification.sender_id, Some(fan.user_id));
        assert_eq!(notification.event_id, Some(f.event.id));
        assert_eq!(notification.notification_type, NotificationType::JoinRequest);
        assert!(!notification.is_read);
        assert!(notification.message.contains("fan@example.com"));

        let jobs = f.store.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].correlation_key.kind, DispatchKind::JoinRequested);
        assert_eq!(jobs[0].inbox_state, StepState::Done);
        assert_eq!(f.queue.keys(), vec![jobs[0].correlation_key]);
        assert!(f.store.invitations().is_empty(), "no invitation is created");
    }

    #[tokio::test]
    async fn test_host_cannot_request_to_join() {
        let f = fixture().await;
        let err = f.handler.request_join(f.event.id, &f.host).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::SelfJoinRequest)
        ));
        assert!(f.store.notifications().is_empty());
        assert!(f.queue.keys().is_empty());
    }

    #[tokio::test]
    async fn test_invited_user_cannot_request_to_join() {
        let f = fixture().await;
        f.manager
            .create(f.event.id, &f.host, "fan@example.com")
            .await
            .unwrap();
        let fan = Identity::new(Uuid::new_v4(), "FAN@example.com");

        let err = f.handler.request_join(f.event.id, &fan).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::AlreadyInvited(InvitationStatus::Pending))
        ));
        assert!(f.store.notifications().is_empty());
        assert_eq!(f.store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_declined_invitee_cannot_request_to_join() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(f.event.id, &f.host, "fan@example.com")
            .await
            .unwrap();
        let fan = Identity::new(Uuid::new_v4(), "fan@example.com");
        f.manager
            .respond(invitation.id, &fan, InvitationStatus::Declined)
            .await
            .unwrap();

        let err = f.handler.request_join(f.event.id, &fan).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::AlreadyInvited(InvitationStatus::Declined))
        ));
    }

    #[tokio::test]
    async fn test_join_request_for_missing_event() {
        let f = fixture().await;
        let fan = Identity::new(Uuid::new_v4(), "fan@example.com");
        let err = f
            .handler
            .request_join(Uuid::new_v4(), &fan)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
