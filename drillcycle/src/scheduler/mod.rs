//! Cycle scheduling.
//!
//! [`CycleScheduler`] is the tick source: it advances the cycle counter,
//! persists each new cycle, and sequences selection, settlement, the fuel
//! economy and session completion for the cycle that just ended.

mod cycle;
mod error;
mod issuance;
mod status;

pub use cycle::{
    CycleScheduler, FinalizeReport, Schedule, SchedulerParts, TickOutcome,
    DEFAULT_CYCLE_DURATION_SECS, DEFAULT_FINALIZE_TIMEOUT_SECS, DEFAULT_RECALIBRATE_EVERY,
};
pub use error::SchedulerError;
pub use issuance::{epoch_of, issuance, DEFAULT_EPOCH_LENGTH, DEFAULT_GENESIS_ISSUANCE};
pub use status::{CycleStatusSnapshot, FinalizedSummary, SchedulerPhase, SharedCycleStatus};
