//! Collaborator interfaces and their in-memory implementations.
//!
//! # Collaborators
//!
//! - [`RecordStore`] - durable CRUD store with batched conditional updates
//!   and a drill change feed
//! - [`CounterCache`] - atomic counter/cache holding the cycle number, the
//!   active-session count and session-scoped entries
//! - [`ReserveSink`] - absorbs undistributed issuance
//!
//! The `Memory*` types implement them for tests, demos and the CLI.

mod counters;
mod error;
mod memory;
mod reserve;
mod traits;

pub use counters::MemoryCounters;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use reserve::{MemoryReserve, ReserveDeposit};
pub use traits::{
    BoxFuture, CounterCache, DrillChange, DrillChangeKind, RecordStore, ReserveSink, StoreResult,
};

/// Well-known counter cache keys.
pub mod keys {
    use crate::model::OperatorId;

    /// Current cycle number.
    pub const CYCLE_COUNTER: &str = "cycle:current";

    /// Number of ACTIVE and STOPPING sessions.
    pub const ACTIVE_SESSIONS: &str = "sessions:active";

    /// Session-scoped cache entry for one operator.
    pub fn session_entry(operator: OperatorId) -> String {
        format!("session:{}", operator)
    }
}
