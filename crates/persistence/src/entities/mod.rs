//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod delivery_audit;
pub mod dispatch_job;
pub mod event;
pub mod identity;
pub mod invitation;
pub mod notification;

pub use delivery_audit::{AuditOutcomeDb, DeliveryAuditEntity};
pub use dispatch_job::{DispatchJobEntity, DispatchKindDb, DispatchStatusDb, StepStateDb};
pub use event::EventEntity;
pub use identity::IdentityEntity;
pub use invitation::{InvitationEntity, InvitationStatusDb};
pub use notification::{NotificationEntity, NotificationTypeDb};
