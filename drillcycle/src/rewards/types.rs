//! Settlement types and errors.

use thiserror::Error;

use crate::model::{Pool, RewardShare};
use crate::store::StoreError;

/// Where the extractor's cycle reward is routed.
///
/// Resolved once per cycle from the extractor's pool membership.
#[derive(Debug, Clone, PartialEq)]
pub enum RewardTarget {
    /// The extractor mines alone; the solo split applies.
    Solo,
    /// The extractor belongs to a pool; the pool's split applies.
    Pooled(Pool),
}

/// Result of settling one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub cycle_number: u64,
    /// Persisted ledger rows, one per operator with a nonzero share.
    pub shares: Vec<RewardShare>,
    /// Amount deposited to the reserve.
    pub reserve: f64,
    /// `None` when there was no extractor or its pool could not be resolved.
    pub target: Option<RewardTarget>,
    /// Operators with an ACTIVE or STOPPING session at settlement.
    pub active_operator_count: u64,
}

impl Settlement {
    /// Sum of all persisted shares.
    pub fn distributed(&self) -> f64 {
        self.shares.iter().map(|s| s.amount).sum()
    }
}

/// Reward settlement errors.
///
/// Pool resolution failures are not errors; they route the pooled
/// allocation to the reserve.
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Failed to fetch active operators for cycle {cycle}: {source}")]
    ActiveOperators { cycle: u64, source: StoreError },

    #[error("Failed to persist reward shares for cycle {cycle}: {source}")]
    PersistShares { cycle: u64, source: StoreError },

    #[error("Failed to deposit reserve for cycle {cycle}: {source}")]
    Reserve { cycle: u64, source: StoreError },

    #[error("Failed to apply rewards for cycle {cycle}: {source}")]
    Apply { cycle: u64, source: StoreError },
}

impl RewardError {
    /// The underlying store error.
    pub fn store_error(&self) -> &StoreError {
        match self {
            RewardError::ActiveOperators { source, .. }
            | RewardError::PersistShares { source, .. }
            | RewardError::Reserve { source, .. }
            | RewardError::Apply { source, .. } => source,
        }
    }
}
