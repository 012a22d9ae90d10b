pub mod events;
pub mod health;
pub mod invitations;
pub mod join_requests;
pub mod notifications;
