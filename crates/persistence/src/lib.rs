//! Persistence layer for the Watch Party backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL implementations of the domain repositories
//! - Query and pool metrics

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
