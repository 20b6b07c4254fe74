//! Service error types.

use thiserror::Error;

use crate::config::ConfigFileError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Errors returned by [`super::CycleService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// A collaborator store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Session request rejected
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Requested cycle does not exist
    #[error("Cycle {0} not found")]
    CycleNotFound(u64),
}

/// Errors from administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The credential is missing or wrong
    #[error("Forbidden: invalid admin credential")]
    Forbidden,

    /// The operation was authorized but the store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
