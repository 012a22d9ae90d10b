//! External service integrations.

pub mod email;

pub use email::EmailService;
