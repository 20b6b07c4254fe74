//! Scheduler errors.

use thiserror::Error;

use crate::rewards::RewardError;
use crate::store::StoreError;

/// Errors from a scheduler tick or finalization pass.
///
/// The run loop logs these and keeps ticking.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to advance cycle counter: {0}")]
    Counter(#[source] StoreError),

    #[error("Failed to persist cycle {cycle}: {source}")]
    PersistCycle { cycle: u64, source: StoreError },

    #[error("Cycle {0} not found")]
    CycleNotFound(u64),

    #[error(transparent)]
    Rewards(#[from] RewardError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedulerError::Counter(e)
            | SchedulerError::PersistCycle { source: e, .. }
            | SchedulerError::Store(e) => e.is_transient(),
            SchedulerError::Rewards(e) => e.store_error().is_transient(),
            SchedulerError::CycleNotFound(_) => false,
        }
    }
}
