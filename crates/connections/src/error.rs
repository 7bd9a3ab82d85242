use thiserror::Error;

use taxlink_auth::AuthzError;
use taxlink_core::{DomainError, ProfileId, ValidationError};

use crate::negotiator::ConnectionTestResult;

/// Profile store failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    NotFound(ProfileId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Unauthorized(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The pre-activation test failed; nothing was persisted.
    #[error("{}", .0.message)]
    TestFailed(ConnectionTestResult),

    #[error("profile {profile_id} still has {count} pending sync job(s)")]
    PendingJobs { profile_id: ProfileId, count: usize },

    #[error("profile has not been saved yet")]
    Unsaved,

    /// Activation needs a successful test against the current settings.
    #[error("profile {0} has no passing connection test; test it before activating")]
    NotTested(ProfileId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
