//! Shared utilities and common types for the Watch Party backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Bearer token verification for identities issued by the auth provider
//! - Common validation logic (e-mail normalization and syntax checks)

pub mod jwt;
pub mod validation;
