//! Repository implementations for database operations.
//!
//! Each repository exposes its queries as inherent methods returning
//! `sqlx::Error` and implements the matching domain trait on top of them.

pub mod dispatch;
pub mod event;
pub mod identity;
pub mod invitation;
pub mod notification;

pub use dispatch::PgDispatchRepository;
pub use event::PgEventRepository;
pub use identity::PgIdentityRepository;
pub use invitation::PgInvitationRepository;
pub use notification::PgNotificationRepository;

use domain::RepositoryError;

/// Maps a driver error to the domain's repository error.
pub(crate) fn db_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Corrupt(err.to_string())
        }
        other => RepositoryError::Database(other.to_string()),
    }
}

/// Whether the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
