//! Domain models for Watch Party.

pub mod dispatch;
pub mod event;
pub mod identity;
pub mod invitation;
pub mod notification;

pub use dispatch::{
    AttemptRecord, AuditOutcome, CorrelationKey, DeliveryAudit, DispatchJob, DispatchKind,
    DispatchPayload, DispatchStatus, EventSummary, InvitationAnsweredPayload,
    InvitationCreatedPayload, JoinRequestedPayload, NewDeliveryAudit, NewDispatchJob, StepState,
};
pub use event::{CreateEventRequest, Event, EventResponse, NewEvent};
pub use identity::Identity;
pub use invitation::{
    CreateInvitationRequest, Invitation, InvitationAnswer, InvitationResponse, InvitationStatus,
    ListInvitationsResponse, NewInvitation, RsvpRequest,
};
pub use notification::{
    ListNotificationsResponse, NewNotification, Notification, NotificationResponse,
    NotificationType,
};
