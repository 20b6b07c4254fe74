//! Reward settlement for concluded cycles.
//!
//! [`RewardDistributor::settle`] splits a cycle's issuance between the
//! extractor, the extractor's pool (if any) and the active operators,
//! persists one ledger row per recipient, deposits the remainder to the
//! reserve and credits every recipient in a single batch.

mod distributor;
mod types;

pub use distributor::{RewardDistributor, DEFAULT_SOLO_ACTIVE_MEMBERS, DEFAULT_SOLO_EXTRACTOR};
pub use types::{RewardError, RewardTarget, Settlement};
