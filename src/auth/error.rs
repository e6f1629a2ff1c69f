//! Error taxonomy for the auth core.
//!
//! Everything except [`AuthError::Storage`] is an expected, user-facing
//! outcome. Storage faults are infrastructure failures and are never retried
//! by the core.

use thiserror::Error;

/// Failures reported by credential and session stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("handle already registered")]
    DuplicateHandle,
    #[error("identity not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("handle already registered")]
    DuplicateHandle,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no session")]
    NoSession,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("insufficient permissions")]
    InsufficientPermissions,
    #[error("identity not found")]
    NotFound,
    #[error("cannot demote the last privileged identity")]
    LastPrivileged,
    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code used in error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DuplicateHandle => "duplicate_handle",
            Self::InvalidCredentials => "invalid_credentials",
            Self::NoSession => "no_session",
            Self::InvalidSession => "invalid_session",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::NotFound => "not_found",
            Self::LastPrivileged => "last_privileged",
            Self::Storage(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateHandle => Self::DuplicateHandle,
            StoreError::NotFound => Self::NotFound,
            StoreError::Backend(source) => Self::Storage(source),
        }
    }
}
