//! Collaborator traits for the durable store, the counter cache and the
//! reserve sink.
//!
//! The engine never talks to a concrete database. Every read and batched
//! write goes through these traits so the same components run against the
//! in-memory implementations in tests and the CLI, and against a real store
//! in production.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::error::StoreError;
use crate::model::{
    ClosedSession, Cycle, CycleOutcome, Drill, DrillId, FinalizeStage, FuelLevel, Operator,
    OperatorId, Pool, PoolId, RewardShare, Session, SessionState,
};

/// Boxed future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of mutation observed on the drill collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillChangeKind {
    Insert,
    Update,
    Replace,
    Delete,
}

/// A single change-feed notification for the drill collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrillChange {
    pub kind: DrillChangeKind,
    pub drill_id: DrillId,
}

/// Durable record store.
///
/// Bulk methods are single batched requests per class of record, never one
/// round trip per operator. None of them spans a cross-store transaction.
pub trait RecordStore: Send + Sync {
    // ── cycles ────────────────────────────────────────────────────────────

    /// Inserts a new cycle row. Fails with [`StoreError::Conflict`] if the
    /// cycle number is already taken.
    fn insert_cycle(&self, cycle: Cycle) -> BoxFuture<'_, StoreResult<()>>;

    fn get_cycle(&self, cycle_number: u64) -> BoxFuture<'_, StoreResult<Option<Cycle>>>;

    /// Highest persisted cycle number, `None` when no cycle exists.
    fn max_cycle_number(&self) -> BoxFuture<'_, StoreResult<Option<u64>>>;

    /// Number of persisted cycle rows.
    fn cycle_count(&self) -> BoxFuture<'_, StoreResult<u64>>;

    /// Writes the settlement outcome and moves the row to
    /// [`FinalizeStage::Settled`]. Returns `false` without modifying the row
    /// if it was already settled or finalized.
    fn record_settlement(
        &self,
        cycle_number: u64,
        outcome: CycleOutcome,
    ) -> BoxFuture<'_, StoreResult<bool>>;

    /// Moves an unfinalized row forward to `stage`. Returns `false` if the row
    /// is finalized or already at or past `stage`.
    fn advance_stage(
        &self,
        cycle_number: u64,
        stage: FinalizeStage,
    ) -> BoxFuture<'_, StoreResult<bool>>;

    /// Marks the row finalized. Returns `false` if it already was.
    fn finalize_cycle(&self, cycle_number: u64) -> BoxFuture<'_, StoreResult<bool>>;

    // ── drills ────────────────────────────────────────────────────────────

    /// All drills with `extractor_eligible && active`.
    fn selectable_drills(&self) -> BoxFuture<'_, StoreResult<Vec<Drill>>>;

    fn get_drill(&self, id: DrillId) -> BoxFuture<'_, StoreResult<Option<Drill>>>;

    /// Subscribes to the drill change feed, if the store offers one.
    fn subscribe_drills(&self) -> Option<broadcast::Receiver<DrillChange>>;

    // ── operators and pools ───────────────────────────────────────────────

    fn get_operator(&self, id: OperatorId) -> BoxFuture<'_, StoreResult<Option<Operator>>>;

    /// Operators whose session is ACTIVE or STOPPING.
    fn running_operators(&self) -> BoxFuture<'_, StoreResult<Vec<Operator>>>;

    fn pool_membership(&self, operator: OperatorId) -> BoxFuture<'_, StoreResult<Option<PoolId>>>;

    fn get_pool(&self, id: PoolId) -> BoxFuture<'_, StoreResult<Option<Pool>>>;

    fn pool_members(&self, id: PoolId) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>>;

    // ── rewards ───────────────────────────────────────────────────────────

    /// Appends ledger rows.
    fn insert_reward_shares(&self, shares: Vec<RewardShare>) -> BoxFuture<'_, StoreResult<()>>;

    fn reward_share(
        &self,
        cycle_number: u64,
        operator: OperatorId,
    ) -> BoxFuture<'_, StoreResult<Option<f64>>>;

    /// Every ledger row of one cycle.
    fn cycle_reward_shares(
        &self,
        cycle_number: u64,
    ) -> BoxFuture<'_, StoreResult<Vec<RewardShare>>>;

    /// Credits rewards in one batch. Operators with a running session accrue
    /// on the session's `earned_reward`; others on `total_earned_reward`.
    fn apply_rewards(&self, credits: Vec<(OperatorId, f64)>) -> BoxFuture<'_, StoreResult<()>>;

    // ── fuel ──────────────────────────────────────────────────────────────

    /// Decrements fuel of the given operators, floored at zero.
    fn deplete_fuel(
        &self,
        operators: Vec<OperatorId>,
        amount: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<FuelLevel>>>;

    /// Increments fuel, capped at `max_fuel`, for every operator not in
    /// `exclude` whose fuel is below max.
    fn replenish_fuel(
        &self,
        exclude: Vec<OperatorId>,
        amount: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<FuelLevel>>>;

    /// Subset of `operators` whose fuel is at or below `threshold`.
    fn operators_at_or_below_fuel(
        &self,
        operators: Vec<OperatorId>,
        threshold: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>>;

    // ── sessions ──────────────────────────────────────────────────────────

    /// The operator's open (non-completed) session.
    fn open_session(&self, operator: OperatorId) -> BoxFuture<'_, StoreResult<Option<Session>>>;

    /// Creates a session. Fails with [`StoreError::Conflict`] if the operator
    /// already has an open session; the check and insert are atomic.
    fn insert_session(
        &self,
        operator: OperatorId,
        state: SessionState,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Session>>;

    /// Moves the operator's open session from `from` to `to`. Returns `false`
    /// if no open session was in state `from`.
    fn transition_session(
        &self,
        operator: OperatorId,
        from: SessionState,
        to: SessionState,
    ) -> BoxFuture<'_, StoreResult<bool>>;

    /// Activates every WAITING session, returning the affected operators.
    fn activate_waiting_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>>;

    /// Closes the running sessions of the given operators. For each one, the
    /// session end time is set, its `earned_reward` is snapshotted and added
    /// to the operator's `total_earned_reward` in the same step.
    fn close_sessions(
        &self,
        operators: Vec<OperatorId>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<ClosedSession>>>;

    /// Closes every STOPPING session the same way as [`close_sessions`].
    ///
    /// [`close_sessions`]: RecordStore::close_sessions
    fn close_stopping_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<ClosedSession>>>;

    /// Authoritative count of ACTIVE and STOPPING sessions.
    fn count_running_sessions(&self) -> BoxFuture<'_, StoreResult<u64>>;
}

/// Fast atomic counter and cache.
pub trait CounterCache: Send + Sync {
    /// Atomically increments and returns the new value (missing keys start at 0).
    fn incr(&self, key: &str) -> BoxFuture<'_, StoreResult<u64>>;

    /// Atomically decrements, floored at zero, and returns the new value.
    fn decr(&self, key: &str) -> BoxFuture<'_, StoreResult<u64>>;

    fn get(&self, key: &str) -> BoxFuture<'_, StoreResult<Option<u64>>>;

    fn set(&self, key: &str, value: u64) -> BoxFuture<'_, StoreResult<()>>;

    /// Stores an opaque cache entry.
    fn put_entry(&self, key: &str, value: String) -> BoxFuture<'_, StoreResult<()>>;

    /// Removes a counter or cache entry. Returns whether anything was removed.
    fn delete(&self, key: &str) -> BoxFuture<'_, StoreResult<bool>>;
}

/// Sink absorbing issuance that was not distributed in a cycle.
pub trait ReserveSink: Send + Sync {
    fn deposit(&self, cycle_number: u64, amount: f64) -> BoxFuture<'_, StoreResult<()>>;
}
