//! Domain layer for the Watch Party backend.
//!
//! This crate contains:
//! - Domain models (Event, Invitation, Notification, DispatchJob)
//! - Repository traits and an in-memory implementation
//! - Business logic services (invitation manager, join requests, dispatcher)
//! - Domain error types

pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use error::{ConflictReason, DomainError, DomainResult, RepoResult, RepositoryError};
