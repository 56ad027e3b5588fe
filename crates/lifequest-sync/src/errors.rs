//! Error types for the sync subsystem.
//!
//! [`BackendError`] classifies failures reported by the hosted services.
//! [`SyncError`] is what manager operations return: precondition rejections
//! plus wrapped backend and decode failures.

use lifequest_core::CoreError;
use thiserror::Error;

/// Failure reported by the auth provider or the document database.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The addressed document or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Security rules rejected the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network or service outage; the call may succeed later.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The request itself was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The user dismissed or blocked the sign-in popup.
    #[error("sign-in cancelled: {0}")]
    SignInCancelled(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Convenience alias for backend call results.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// The message text was blank after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// The community name was blank after trimming.
    #[error("community name is empty")]
    EmptyCommunityName,

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Document data could not be decoded or an id was invalid.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, SyncError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
