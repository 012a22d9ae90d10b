//! Common validation utilities.

use validator::{ValidateEmail, ValidationError};

/// Normalizes an e-mail address for use as a correlation key.
///
/// Addresses are compared case-insensitively and without surrounding
/// whitespace everywhere in the system.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates that an e-mail address is syntactically valid.
pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    let trimmed = email.trim();
    if !trimmed.is_empty() && trimmed.validate_email() {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_invalid");
        err.message = Some("Invalid email address".into());
        Err(err)
    }
}

/// Returns true when two addresses refer to the same mailbox.
pub fn same_email(a: &str, b: &str) -> bool {
    normalize_email(a) == normalize_email(b)
}
