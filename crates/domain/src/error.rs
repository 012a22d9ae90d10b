//! Domain error types.

use thiserror::Error;

use crate::models::InvitationStatus;

/// Failure reported by a repository implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The storage engine rejected or failed the operation.
    #[error("Database error: {0}")]
    Database(String),

    /// The storage engine could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Why a state transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictReason {
    #[error("Invitation already exists (status: {0})")]
    DuplicateInvitation(InvitationStatus),

    #[error("Invitation has already been answered (status: {0})")]
    AlreadyAnswered(InvitationStatus),

    #[error("You cannot request to join your own event")]
    SelfJoinRequest,

    #[error("You have already been invited to this event (status: {0})")]
    AlreadyInvited(InvitationStatus),
}

impl ConflictReason {
    /// Status of the invitation that caused the conflict, if any.
    pub fn existing_status(&self) -> Option<InvitationStatus> {
        match self {
            ConflictReason::DuplicateInvitation(s)
            | ConflictReason::AlreadyAnswered(s)
            | ConflictReason::AlreadyInvited(s) => Some(*s),
            ConflictReason::SelfJoinRequest => None,
        }
    }
}

/// Error returned by domain services to their callers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Conflict(ConflictReason),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ConflictReason> for DomainError {
    fn from(reason: ConflictReason) -> Self {
        DomainError::Conflict(reason)
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
