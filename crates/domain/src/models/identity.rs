//! Authenticated identity.

use serde::{Deserialize, Serialize};
use shared::validation::{normalize_email, same_email};
use uuid::Uuid;

/// An account holder as asserted by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    /// Normalized e-mail address.
    pub email: String,
}

impl Identity {
    pub fn new(user_id: Uuid, email: &str) -> Self {
        Self {
            user_id,
            email: normalize_email(email),
        }
    }

    /// Whether this identity owns the given mailbox.
    pub fn has_email(&self, email: &str) -> bool {
        same_email(&self.email, email)
    }
}
