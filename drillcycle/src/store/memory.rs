//! In-memory record store.
//!
//! Holds every collection behind a single `parking_lot::RwLock`, so each
//! trait method is atomic with respect to the others. Drill mutations made
//! through the seeding API are published on a `broadcast` change feed, the
//! same way a document store would stream change events.
//!
//! Individual operations can be made to fail with
//! [`MemoryStore::fail_operation`] to exercise the engine's partial-failure
//! paths.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::error::StoreError;
use super::traits::{BoxFuture, DrillChange, DrillChangeKind, RecordStore, StoreResult};
use crate::efficiency::cumulative_efficiency;
use crate::model::{
    ClosedSession, Cycle, CycleOutcome, Drill, DrillId, FinalizeStage, FuelLevel, Operator,
    OperatorId, Pool, PoolId, RewardShare, Session, SessionId, SessionState,
};

/// Capacity of the drill change-feed channel.
const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    cycles: BTreeMap<u64, Cycle>,
    drills: BTreeMap<DrillId, Drill>,
    operators: BTreeMap<OperatorId, Operator>,
    pools: HashMap<PoolId, Pool>,
    memberships: HashMap<OperatorId, PoolId>,
    sessions: BTreeMap<SessionId, Session>,
    open_sessions: HashMap<OperatorId, SessionId>,
    reward_shares: Vec<RewardShare>,
    next_session_id: u64,
}

impl Inner {
    fn cycle_mut(&mut self, cycle_number: u64) -> StoreResult<&mut Cycle> {
        self.cycles
            .get_mut(&cycle_number)
            .ok_or_else(|| StoreError::NotFound(format!("cycle {}", cycle_number)))
    }

    fn open_session(&self, operator: OperatorId) -> Option<&Session> {
        self.open_sessions
            .get(&operator)
            .and_then(|id| self.sessions.get(id))
    }

    fn running_operator_ids(&self) -> Vec<OperatorId> {
        let mut ids: Vec<OperatorId> = self
            .open_sessions
            .iter()
            .filter(|(_, sid)| {
                self.sessions
                    .get(sid)
                    .map(|s| s.state.is_running())
                    .unwrap_or(false)
            })
            .map(|(op, _)| *op)
            .collect();
        ids.sort();
        ids
    }

    /// Closes the operator's open session if `predicate` accepts its state.
    fn close_session_if(
        &mut self,
        operator: OperatorId,
        now: DateTime<Utc>,
        predicate: impl Fn(SessionState) -> bool,
    ) -> Option<ClosedSession> {
        let session_id = *self.open_sessions.get(&operator)?;
        let session = self.sessions.get_mut(&session_id)?;
        if !predicate(session.state) {
            return None;
        }

        session.state = SessionState::Completed;
        session.end_time = Some(now);
        let earned_reward = session.earned_reward;
        self.open_sessions.remove(&operator);

        if let Some(op) = self.operators.get_mut(&operator) {
            op.total_earned_reward += earned_reward;
        }

        Some(ClosedSession {
            session_id,
            operator_id: operator,
            earned_reward,
            end_time: now,
        })
    }
}

fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, T> {
    Box::pin(std::future::ready(value))
}

/// In-memory implementation of [`RecordStore`].
pub struct MemoryStore {
    inner: RwLock<Inner>,
    change_feed: RwLock<Option<broadcast::Sender<DrillChange>>>,
    failures: DashMap<&'static str, StoreError>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with a drill change feed.
    pub fn new() -> Self {
        Self::with_feed_capacity(CHANGE_FEED_CAPACITY)
    }

    /// Creates an empty store whose change feed buffers at most `capacity`
    /// events per subscriber before it lags.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: RwLock::new(Inner::default()),
            change_feed: RwLock::new(Some(tx)),
            failures: DashMap::new(),
        }
    }

    /// Creates an empty store that offers no change feed.
    pub fn without_change_feed() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            change_feed: RwLock::new(None),
            failures: DashMap::new(),
        }
    }

    /// Drops the change feed. Subscribers observe a closed channel and new
    /// subscriptions get none.
    pub fn close_change_feed(&self) {
        self.change_feed.write().take();
    }

    // ── fault injection ───────────────────────────────────────────────────

    /// Makes every call of the named trait method fail with `error`.
    pub fn fail_operation(&self, operation: &'static str, error: StoreError) {
        self.failures.insert(operation, error);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    fn guard(&self, operation: &'static str) -> StoreResult<()> {
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn publish(&self, kind: DrillChangeKind, drill_id: DrillId) {
        if let Some(tx) = self.change_feed.read().as_ref() {
            // No subscribers is not an error.
            let _ = tx.send(DrillChange { kind, drill_id });
        }
    }

    // ── seeding and inspection ────────────────────────────────────────────

    pub fn upsert_operator(&self, operator: Operator) {
        self.inner.write().operators.insert(operator.id, operator);
    }

    pub fn operator(&self, id: OperatorId) -> Option<Operator> {
        self.inner.read().operators.get(&id).cloned()
    }

    pub fn operators(&self) -> Vec<Operator> {
        self.inner.read().operators.values().cloned().collect()
    }

    /// Inserts or replaces a drill and publishes the change.
    pub fn upsert_drill(&self, drill: Drill) {
        let id = drill.id;
        let existed = self.inner.write().drills.insert(id, drill).is_some();
        let kind = if existed {
            DrillChangeKind::Update
        } else {
            DrillChangeKind::Insert
        };
        self.publish(kind, id);
    }

    /// Deletes a drill and publishes the change.
    pub fn remove_drill(&self, id: DrillId) -> Option<Drill> {
        let removed = self.inner.write().drills.remove(&id);
        if removed.is_some() {
            self.publish(DrillChangeKind::Delete, id);
        }
        removed
    }

    pub fn drills_of(&self, operator: OperatorId) -> Vec<Drill> {
        self.inner
            .read()
            .drills
            .values()
            .filter(|d| d.owner_operator_id == operator)
            .cloned()
            .collect()
    }

    /// Recomputes an operator's cumulative efficiency from its drills.
    pub fn refresh_efficiency(&self, operator: OperatorId, luck: f64) -> Option<f64> {
        let mut inner = self.inner.write();
        let drills: Vec<Drill> = inner
            .drills
            .values()
            .filter(|d| d.owner_operator_id == operator)
            .cloned()
            .collect();
        let op = inner.operators.get_mut(&operator)?;
        op.cumulative_efficiency = cumulative_efficiency(
            &drills,
            op.efficiency_multiplier,
            op.efficiency_credits,
            luck,
        );
        Some(op.cumulative_efficiency)
    }

    pub fn insert_pool(&self, pool: Pool) {
        self.inner.write().pools.insert(pool.id, pool);
    }

    /// Adds the operator to a pool, replacing any previous membership.
    pub fn join_pool(&self, operator: OperatorId, pool: PoolId) {
        self.inner.write().memberships.insert(operator, pool);
    }

    pub fn leave_pool(&self, operator: OperatorId) {
        self.inner.write().memberships.remove(&operator);
    }

    pub fn sessions_of(&self, operator: OperatorId) -> Vec<Session> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.operator_id == operator)
            .cloned()
            .collect()
    }

    pub fn cycles(&self) -> Vec<Cycle> {
        self.inner.read().cycles.values().cloned().collect()
    }

    pub fn reward_shares(&self, cycle_number: u64) -> Vec<RewardShare> {
        self.inner
            .read()
            .reward_shares
            .iter()
            .filter(|s| s.cycle_number == cycle_number)
            .cloned()
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn insert_cycle(&self, cycle: Cycle) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.guard("insert_cycle").and_then(|_| {
            let mut inner = self.inner.write();
            if inner.cycles.contains_key(&cycle.cycle_number) {
                return Err(StoreError::Conflict(format!(
                    "cycle {}",
                    cycle.cycle_number
                )));
            }
            inner.cycles.insert(cycle.cycle_number, cycle);
            Ok(())
        });
        ready(result)
    }

    fn get_cycle(&self, cycle_number: u64) -> BoxFuture<'_, StoreResult<Option<Cycle>>> {
        let result = self
            .guard("get_cycle")
            .map(|_| self.inner.read().cycles.get(&cycle_number).cloned());
        ready(result)
    }

    fn max_cycle_number(&self) -> BoxFuture<'_, StoreResult<Option<u64>>> {
        let result = self
            .guard("max_cycle_number")
            .map(|_| self.inner.read().cycles.keys().next_back().copied());
        ready(result)
    }

    fn cycle_count(&self) -> BoxFuture<'_, StoreResult<u64>> {
        let result = self
            .guard("cycle_count")
            .map(|_| self.inner.read().cycles.len() as u64);
        ready(result)
    }

    fn record_settlement(
        &self,
        cycle_number: u64,
        outcome: CycleOutcome,
    ) -> BoxFuture<'_, StoreResult<bool>> {
        let result = self.guard("record_settlement").and_then(|_| {
            let mut inner = self.inner.write();
            let cycle = inner.cycle_mut(cycle_number)?;
            if cycle.finalized || cycle.stage != FinalizeStage::Pending {
                return Ok(false);
            }
            cycle.extractor_drill_id = outcome.extractor_drill_id;
            cycle.extractor_operator_id = outcome.extractor_operator_id;
            cycle.active_operator_count = outcome.active_operator_count;
            cycle.total_weighted_efficiency = outcome.total_weighted_efficiency;
            cycle.stage = FinalizeStage::Settled;
            Ok(true)
        });
        ready(result)
    }

    fn advance_stage(
        &self,
        cycle_number: u64,
        stage: FinalizeStage,
    ) -> BoxFuture<'_, StoreResult<bool>> {
        let result = self.guard("advance_stage").and_then(|_| {
            let mut inner = self.inner.write();
            let cycle = inner.cycle_mut(cycle_number)?;
            if cycle.finalized || cycle.stage >= stage {
                return Ok(false);
            }
            cycle.stage = stage;
            Ok(true)
        });
        ready(result)
    }

    fn finalize_cycle(&self, cycle_number: u64) -> BoxFuture<'_, StoreResult<bool>> {
        let result = self.guard("finalize_cycle").and_then(|_| {
            let mut inner = self.inner.write();
            let cycle = inner.cycle_mut(cycle_number)?;
            if cycle.finalized {
                return Ok(false);
            }
            cycle.finalized = true;
            Ok(true)
        });
        ready(result)
    }

    fn selectable_drills(&self) -> BoxFuture<'_, StoreResult<Vec<Drill>>> {
        let result = self.guard("selectable_drills").map(|_| {
            self.inner
                .read()
                .drills
                .values()
                .filter(|d| d.is_selectable())
                .cloned()
                .collect()
        });
        ready(result)
    }

    fn get_drill(&self, id: DrillId) -> BoxFuture<'_, StoreResult<Option<Drill>>> {
        let result = self
            .guard("get_drill")
            .map(|_| self.inner.read().drills.get(&id).cloned());
        ready(result)
    }

    fn subscribe_drills(&self) -> Option<broadcast::Receiver<DrillChange>> {
        self.change_feed.read().as_ref().map(|tx| tx.subscribe())
    }

    fn get_operator(&self, id: OperatorId) -> BoxFuture<'_, StoreResult<Option<Operator>>> {
        let result = self
            .guard("get_operator")
            .map(|_| self.inner.read().operators.get(&id).cloned());
        ready(result)
    }

    fn running_operators(&self) -> BoxFuture<'_, StoreResult<Vec<Operator>>> {
        let result = self.guard("running_operators").map(|_| {
            let inner = self.inner.read();
            inner
                .running_operator_ids()
                .into_iter()
                .filter_map(|id| inner.operators.get(&id).cloned())
                .collect()
        });
        ready(result)
    }

    fn pool_membership(&self, operator: OperatorId) -> BoxFuture<'_, StoreResult<Option<PoolId>>> {
        let result = self
            .guard("pool_membership")
            .map(|_| self.inner.read().memberships.get(&operator).copied());
        ready(result)
    }

    fn get_pool(&self, id: PoolId) -> BoxFuture<'_, StoreResult<Option<Pool>>> {
        let result = self
            .guard("get_pool")
            .map(|_| self.inner.read().pools.get(&id).cloned());
        ready(result)
    }

    fn pool_members(&self, id: PoolId) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>> {
        let result = self.guard("pool_members").map(|_| {
            let mut members: Vec<OperatorId> = self
                .inner
                .read()
                .memberships
                .iter()
                .filter(|(_, pool)| **pool == id)
                .map(|(op, _)| *op)
                .collect();
            members.sort();
            members
        });
        ready(result)
    }

    fn insert_reward_shares(&self, shares: Vec<RewardShare>) -> BoxFuture<'_, StoreResult<()>> {
        let result = self
            .guard("insert_reward_shares")
            .map(|_| self.inner.write().reward_shares.extend(shares));
        ready(result)
    }

    fn reward_share(
        &self,
        cycle_number: u64,
        operator: OperatorId,
    ) -> BoxFuture<'_, StoreResult<Option<f64>>> {
        let result = self.guard("reward_share").map(|_| {
            self.inner
                .read()
                .reward_shares
                .iter()
                .find(|s| s.cycle_number == cycle_number && s.operator_id == operator)
                .map(|s| s.amount)
        });
        ready(result)
    }

    fn cycle_reward_shares(
        &self,
        cycle_number: u64,
    ) -> BoxFuture<'_, StoreResult<Vec<RewardShare>>> {
        let result = self
            .guard("cycle_reward_shares")
            .map(|_| self.reward_shares(cycle_number));
        ready(result)
    }

    fn apply_rewards(&self, credits: Vec<(OperatorId, f64)>) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.guard("apply_rewards").map(|_| {
            let mut inner = self.inner.write();
            for (operator, amount) in credits {
                let running = inner
                    .open_session(operator)
                    .filter(|s| s.state.is_running())
                    .map(|s| s.id);
                if let Some(session) = running.and_then(|id| inner.sessions.get_mut(&id)) {
                    session.earned_reward += amount;
                    continue;
                }
                if let Some(op) = inner.operators.get_mut(&operator) {
                    op.total_earned_reward += amount;
                }
            }
        });
        ready(result)
    }

    fn deplete_fuel(
        &self,
        operators: Vec<OperatorId>,
        amount: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<FuelLevel>>> {
        let result = self.guard("deplete_fuel").map(|_| {
            let mut inner = self.inner.write();
            let mut levels = Vec::with_capacity(operators.len());
            for id in &operators {
                if let Some(op) = inner.operators.get_mut(id) {
                    op.current_fuel = (op.current_fuel - amount).max(0.0);
                    levels.push(FuelLevel {
                        operator_id: op.id,
                        current_fuel: op.current_fuel,
                        max_fuel: op.max_fuel,
                    });
                }
            }
            levels
        });
        ready(result)
    }

    fn replenish_fuel(
        &self,
        exclude: Vec<OperatorId>,
        amount: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<FuelLevel>>> {
        let result = self.guard("replenish_fuel").map(|_| {
            let exclude: HashSet<OperatorId> = exclude.into_iter().collect();
            let mut inner = self.inner.write();
            inner
                .operators
                .values_mut()
                .filter(|op| !exclude.contains(&op.id) && op.current_fuel < op.max_fuel)
                .map(|op| {
                    op.current_fuel = (op.current_fuel + amount).min(op.max_fuel);
                    FuelLevel {
                        operator_id: op.id,
                        current_fuel: op.current_fuel,
                        max_fuel: op.max_fuel,
                    }
                })
                .collect()
        });
        ready(result)
    }

    fn operators_at_or_below_fuel(
        &self,
        operators: Vec<OperatorId>,
        threshold: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>> {
        let result = self.guard("operators_at_or_below_fuel").map(|_| {
            let inner = self.inner.read();
            operators
                .into_iter()
                .filter(|id| {
                    inner
                        .operators
                        .get(id)
                        .map(|op| op.current_fuel <= threshold)
                        .unwrap_or(false)
                })
                .collect()
        });
        ready(result)
    }

    fn open_session(&self, operator: OperatorId) -> BoxFuture<'_, StoreResult<Option<Session>>> {
        let result = self
            .guard("open_session")
            .map(|_| self.inner.read().open_session(operator).cloned());
        ready(result)
    }

    fn insert_session(
        &self,
        operator: OperatorId,
        state: SessionState,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Session>> {
        let result = self.guard("insert_session").and_then(|_| {
            let mut inner = self.inner.write();
            if inner.open_sessions.contains_key(&operator) {
                return Err(StoreError::Conflict(format!(
                    "open session for operator {}",
                    operator
                )));
            }
            inner.next_session_id += 1;
            let session = Session {
                id: SessionId(inner.next_session_id),
                operator_id: operator,
                state,
                start_time: now,
                end_time: None,
                earned_reward: 0.0,
            };
            inner.open_sessions.insert(operator, session.id);
            inner.sessions.insert(session.id, session.clone());
            Ok(session)
        });
        ready(result)
    }

    fn transition_session(
        &self,
        operator: OperatorId,
        from: SessionState,
        to: SessionState,
    ) -> BoxFuture<'_, StoreResult<bool>> {
        let result = self.guard("transition_session").map(|_| {
            let mut inner = self.inner.write();
            let Some(session_id) = inner.open_sessions.get(&operator).copied() else {
                return false;
            };
            let Some(session) = inner.sessions.get_mut(&session_id) else {
                return false;
            };
            if session.state != from {
                return false;
            }
            session.state = to;
            if to == SessionState::Completed {
                inner.open_sessions.remove(&operator);
            }
            true
        });
        ready(result)
    }

    fn activate_waiting_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<OperatorId>>> {
        let result = self.guard("activate_waiting_sessions").map(|_| {
            let mut inner = self.inner.write();
            let mut activated = Vec::new();
            for session in inner.sessions.values_mut() {
                if session.state == SessionState::Waiting {
                    session.state = SessionState::Active;
                    session.start_time = now;
                    activated.push(session.operator_id);
                }
            }
            activated.sort();
            activated
        });
        ready(result)
    }

    fn close_sessions(
        &self,
        operators: Vec<OperatorId>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<ClosedSession>>> {
        let result = self.guard("close_sessions").map(|_| {
            let mut inner = self.inner.write();
            operators
                .into_iter()
                .filter_map(|op| inner.close_session_if(op, now, SessionState::is_running))
                .collect()
        });
        ready(result)
    }

    fn close_stopping_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<ClosedSession>>> {
        let result = self.guard("close_stopping_sessions").map(|_| {
            let mut inner = self.inner.write();
            let stopping: Vec<OperatorId> = inner
                .sessions
                .values()
                .filter(|s| s.state == SessionState::Stopping)
                .map(|s| s.operator_id)
                .collect();
            stopping
                .into_iter()
                .filter_map(|op| {
                    inner.close_session_if(op, now, |state| state == SessionState::Stopping)
                })
                .collect()
        });
        ready(result)
    }

    fn count_running_sessions(&self) -> BoxFuture<'_, StoreResult<u64>> {
        let result = self
            .guard("count_running_sessions")
            .map(|_| self.inner.read().running_operator_ids().len() as u64);
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RewardSplit;

    fn operator(id: u64, fuel: f64, max: f64) -> Operator {
        let mut op = Operator::new(OperatorId(id), format!("op-{}", id), max);
        op.current_fuel = fuel;
        op
    }

    fn drill(id: u64, owner: u64, eff: f64, eligible: bool, active: bool) -> Drill {
        Drill {
            id: DrillId(id),
            owner_operator_id: OperatorId(owner),
            efficiency_rating: eff,
            extractor_eligible: eligible,
            active,
        }
    }

    #[tokio::test]
    async fn test_insert_cycle_rejects_duplicates() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_cycle(Cycle::open(1, now, now, 100)).await.unwrap();

        let err = store
            .insert_cycle(Cycle::open(1, now, now, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.max_cycle_number().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_finalize_cycle_only_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_cycle(Cycle::open(4, now, now, 100)).await.unwrap();

        assert!(store.finalize_cycle(4).await.unwrap());
        assert!(!store.finalize_cycle(4).await.unwrap());
        let err = store.finalize_cycle(5).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finalize_stages_only_move_forward() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_cycle(Cycle::open(4, now, now, 100)).await.unwrap();
        let outcome = CycleOutcome {
            extractor_drill_id: Some(DrillId(1)),
            extractor_operator_id: Some(OperatorId(1)),
            active_operator_count: 2,
            total_weighted_efficiency: 12.0,
        };

        assert!(store.record_settlement(4, outcome.clone()).await.unwrap());
        assert!(!store.record_settlement(4, outcome).await.unwrap());
        let cycle = store.get_cycle(4).await.unwrap().unwrap();
        assert_eq!(cycle.stage, FinalizeStage::Settled);
        assert_eq!(cycle.extractor_operator_id, Some(OperatorId(1)));
        assert!(!cycle.finalized);

        assert!(!store.advance_stage(4, FinalizeStage::Settled).await.unwrap());
        assert!(store.advance_stage(4, FinalizeStage::Fueled).await.unwrap());
        assert!(store.finalize_cycle(4).await.unwrap());
        assert!(!store.advance_stage(4, FinalizeStage::Fueled).await.unwrap());
    }

    #[tokio::test]
    async fn test_selectable_drills_filters_flags() {
        let store = MemoryStore::new();
        store.upsert_drill(drill(1, 1, 10.0, true, true));
        store.upsert_drill(drill(2, 1, 10.0, false, true));
        store.upsert_drill(drill(3, 1, 10.0, true, false));

        let drills = store.selectable_drills().await.unwrap();
        assert_eq!(drills.len(), 1);
        assert_eq!(drills[0].id, DrillId(1));
    }

    #[tokio::test]
    async fn test_drill_mutations_are_published() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe_drills().unwrap();

        store.upsert_drill(drill(1, 1, 10.0, true, true));
        store.upsert_drill(drill(1, 1, 12.0, true, true));
        store.remove_drill(DrillId(1));

        assert_eq!(rx.recv().await.unwrap().kind, DrillChangeKind::Insert);
        assert_eq!(rx.recv().await.unwrap().kind, DrillChangeKind::Update);
        assert_eq!(rx.recv().await.unwrap().kind, DrillChangeKind::Delete);
    }

    #[test]
    fn test_store_without_feed_has_no_subscription() {
        let store = MemoryStore::without_change_feed();
        assert!(store.subscribe_drills().is_none());
    }

    #[tokio::test]
    async fn test_one_open_session_per_operator() {
        let store = MemoryStore::new();
        store.upsert_operator(operator(1, 50.0, 100.0));
        let now = Utc::now();

        store
            .insert_session(OperatorId(1), SessionState::Active, now)
            .await
            .unwrap();
        let err = store
            .insert_session(OperatorId(1), SessionState::Active, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rewards_accrue_on_running_session_then_fold_on_close() {
        let store = MemoryStore::new();
        store.upsert_operator(operator(1, 50.0, 100.0));
        store.upsert_operator(operator(2, 50.0, 100.0));
        let now = Utc::now();
        store
            .insert_session(OperatorId(1), SessionState::Active, now)
            .await
            .unwrap();

        store
            .apply_rewards(vec![(OperatorId(1), 5.0), (OperatorId(2), 3.0)])
            .await
            .unwrap();

        assert_eq!(store.operator(OperatorId(1)).unwrap().total_earned_reward, 0.0);
        assert_eq!(store.operator(OperatorId(2)).unwrap().total_earned_reward, 3.0);

        let closed = store.close_sessions(vec![OperatorId(1)], now).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].earned_reward, 5.0);
        assert_eq!(store.operator(OperatorId(1)).unwrap().total_earned_reward, 5.0);
        assert!(store.open_session(OperatorId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fuel_updates_respect_bounds() {
        let store = MemoryStore::new();
        store.upsert_operator(operator(1, 3.0, 100.0));
        store.upsert_operator(operator(2, 98.0, 100.0));
        store.upsert_operator(operator(3, 100.0, 100.0));

        let depleted = store.deplete_fuel(vec![OperatorId(1)], 5.0).await.unwrap();
        assert_eq!(depleted[0].current_fuel, 0.0);

        let replenished = store
            .replenish_fuel(vec![OperatorId(1)], 5.0)
            .await
            .unwrap();
        assert_eq!(replenished.len(), 1);
        assert_eq!(replenished[0].operator_id, OperatorId(2));
        assert_eq!(replenished[0].current_fuel, 100.0);

        let low = store
            .operators_at_or_below_fuel(vec![OperatorId(1), OperatorId(2)], 0.0)
            .await
            .unwrap();
        assert_eq!(low, vec![OperatorId(1)]);
    }

    #[tokio::test]
    async fn test_pool_membership_is_exclusive() {
        let store = MemoryStore::new();
        for id in [1, 2] {
            store.insert_pool(Pool {
                id: PoolId(id),
                leader_operator_id: None,
                reward_split: RewardSplit::new(0.3, 0.1, 0.5),
            });
        }
        store.join_pool(OperatorId(7), PoolId(1));
        store.join_pool(OperatorId(7), PoolId(2));

        assert_eq!(
            store.pool_membership(OperatorId(7)).await.unwrap(),
            Some(PoolId(2))
        );
        assert!(store.pool_members(PoolId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_surface_until_cleared() {
        let store = MemoryStore::new();
        store.fail_operation("get_pool", StoreError::Timeout("get_pool".into()));

        assert!(store.get_pool(PoolId(1)).await.is_err());
        store.clear_failures();
        assert!(store.get_pool(PoolId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_stopping_leaves_active_sessions() {
        let store = MemoryStore::new();
        store.upsert_operator(operator(1, 50.0, 100.0));
        store.upsert_operator(operator(2, 50.0, 100.0));
        let now = Utc::now();
        for id in [1, 2] {
            store
                .insert_session(OperatorId(id), SessionState::Active, now)
                .await
                .unwrap();
        }
        store
            .transition_session(OperatorId(2), SessionState::Active, SessionState::Stopping)
            .await
            .unwrap();

        let closed = store.close_stopping_sessions(now).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].operator_id, OperatorId(2));
        assert_eq!(store.count_running_sessions().await.unwrap(), 1);
    }
}
