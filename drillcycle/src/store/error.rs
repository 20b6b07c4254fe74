//! Store error types.

use thiserror::Error;

/// Errors returned by the record store, counter cache and reserve sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store did not answer in time.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The backing store rejected or could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record with the same identity already exists.
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Timeout("get_pool".into()).is_transient());
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::Conflict("cycle 3".into()).is_transient());
        assert!(!StoreError::NotFound("operator 9".into()).is_transient());
    }

    #[test]
    fn test_display_includes_context() {
        let err = StoreError::Conflict("cycle 3".to_string());
        assert!(err.to_string().contains("already exists"));
        assert!(err.to_string().contains("cycle 3"));
    }
}
