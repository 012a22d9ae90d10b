//! Domain services for Watch Party.
//!
//! Services contain business logic that operates on domain models through
//! the repository traits.

pub mod dispatcher;
pub mod invitation_manager;
pub mod join_request;
pub mod mail;
pub mod retry;
pub mod templates;

pub use dispatcher::{
    enqueue_after_commit, DeliveryOutcome, DispatchQueue, Dispatcher, DispatcherSettings,
    EnqueueError, RecordingQueue,
};
pub use invitation_manager::InvitationManager;
pub use join_request::JoinRequestHandler;
pub use mail::{EmailMessage, MailError, MailTransport, MockMailTransport, ScriptedSend};
pub use retry::RetryPolicy;
pub use templates::{MessageTemplates, TemplateStyle};
