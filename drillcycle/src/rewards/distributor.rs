//! Reward distributor.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{RewardError, RewardTarget, Settlement};
use crate::model::{Operator, OperatorId, Pool, PoolId, RewardShare, RewardSplit};
use crate::store::{RecordStore, ReserveSink, StoreError};

/// Default fraction of issuance paid to a solo extractor.
pub const DEFAULT_SOLO_EXTRACTOR: f64 = 0.5;

/// Default fraction of issuance shared across all active operators.
pub const DEFAULT_SOLO_ACTIVE_MEMBERS: f64 = 0.4;

/// Why a pooled allocation could not be computed.
#[derive(Debug, Error)]
enum PoolFailure {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("pool {0} does not exist")]
    MissingPool(PoolId),

    #[error("pool {0} has an invalid reward split")]
    InvalidSplit(PoolId),
}

/// Per-operator amounts accumulated during settlement.
#[derive(Debug, Default)]
struct Ledger {
    amounts: BTreeMap<OperatorId, f64>,
}

impl Ledger {
    fn credit(&mut self, operator: OperatorId, amount: f64) {
        if amount > 0.0 {
            *self.amounts.entry(operator).or_insert(0.0) += amount;
        }
    }

    /// Splits `amount` across `recipients` proportional to cumulative
    /// efficiency. Nothing is credited when the total efficiency is zero.
    fn distribute<'a>(&mut self, amount: f64, recipients: impl IntoIterator<Item = &'a Operator>) {
        if amount <= 0.0 {
            return;
        }
        let weighted: Vec<(OperatorId, f64)> = recipients
            .into_iter()
            .map(|op| (op.id, efficiency_weight(op)))
            .collect();
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            debug!(
                amount,
                recipients = weighted.len(),
                "Zero recipient efficiency, allocation to reserve"
            );
            return;
        }
        for (id, weight) in weighted {
            self.credit(id, amount * weight / total);
        }
    }

    fn merge(&mut self, other: Ledger) {
        for (id, amount) in other.amounts {
            self.credit(id, amount);
        }
    }

    fn into_shares(self, cycle_number: u64) -> Vec<RewardShare> {
        self.amounts
            .into_iter()
            .filter(|(_, amount)| *amount != 0.0)
            .map(|(operator_id, amount)| RewardShare {
                cycle_number,
                operator_id,
                amount,
            })
            .collect()
    }
}

fn efficiency_weight(op: &Operator) -> f64 {
    if op.cumulative_efficiency.is_finite() && op.cumulative_efficiency > 0.0 {
        op.cumulative_efficiency
    } else {
        0.0
    }
}

/// Computes and persists per-operator reward shares for a concluded cycle.
pub struct RewardDistributor {
    store: Arc<dyn RecordStore>,
    reserve: Arc<dyn ReserveSink>,
    solo_split: RewardSplit,
}

impl RewardDistributor {
    pub fn new(store: Arc<dyn RecordStore>, reserve: Arc<dyn ReserveSink>) -> Self {
        Self {
            store,
            reserve,
            solo_split: RewardSplit::new(DEFAULT_SOLO_EXTRACTOR, 0.0, DEFAULT_SOLO_ACTIVE_MEMBERS),
        }
    }

    /// Sets the split used when the extractor is not pooled.
    ///
    /// The leader fraction is ignored for solo settlement.
    pub fn with_solo_split(mut self, extractor: f64, active_members: f64) -> Self {
        self.solo_split = RewardSplit::new(extractor, 0.0, active_members);
        self
    }

    pub fn solo_split(&self) -> RewardSplit {
        self.solo_split
    }

    /// Resolves the reward target for an extractor.
    pub async fn resolve_target(&self, extractor: OperatorId) -> Result<RewardTarget, StoreError> {
        self.try_resolve_target(extractor).await.map_err(|e| match e {
            PoolFailure::Store(err) => err,
            other => StoreError::NotFound(other.to_string()),
        })
    }

    async fn try_resolve_target(&self, extractor: OperatorId) -> Result<RewardTarget, PoolFailure> {
        let Some(pool_id) = self.store.pool_membership(extractor).await? else {
            return Ok(RewardTarget::Solo);
        };
        let pool = self
            .store
            .get_pool(pool_id)
            .await?
            .ok_or(PoolFailure::MissingPool(pool_id))?;
        if !pool.reward_split.is_valid() {
            return Err(PoolFailure::InvalidSplit(pool.id));
        }
        Ok(RewardTarget::Pooled(pool))
    }

    async fn pooled_allocation(
        &self,
        pool: &Pool,
        extractor: OperatorId,
        active: &[Operator],
        issued: f64,
    ) -> Result<Ledger, PoolFailure> {
        let members: HashSet<OperatorId> =
            self.store.pool_members(pool.id).await?.into_iter().collect();
        let split = pool.reward_split;

        let mut ledger = Ledger::default();
        ledger.credit(extractor, issued * split.extractor);
        if let Some(leader) = pool.leader_operator_id {
            ledger.credit(leader, issued * split.leader);
        }
        ledger.distribute(
            issued * split.active_members,
            active.iter().filter(|op| members.contains(&op.id)),
        );
        Ok(ledger)
    }

    /// Settles `issued_amount` for a cycle.
    ///
    /// Whatever is not assigned to an operator is deposited to the reserve
    /// once, so the shares and the reserve always sum to the issuance.
    pub async fn settle(
        &self,
        cycle_number: u64,
        extractor: Option<OperatorId>,
        issued_amount: u64,
    ) -> Result<Settlement, RewardError> {
        let active = self
            .store
            .running_operators()
            .await
            .map_err(|source| RewardError::ActiveOperators {
                cycle: cycle_number,
                source,
            })?;
        let issued = issued_amount as f64;
        let mut ledger = Ledger::default();
        let mut target = None;

        match extractor {
            None => {
                ledger.distribute(issued * self.solo_split.active_members, &active);
            }
            Some(extractor) => match self.try_resolve_target(extractor).await {
                Ok(RewardTarget::Solo) => {
                    ledger.credit(extractor, issued * self.solo_split.extractor);
                    ledger.distribute(issued * self.solo_split.active_members, &active);
                    target = Some(RewardTarget::Solo);
                }
                Ok(RewardTarget::Pooled(pool)) => {
                    match self.pooled_allocation(&pool, extractor, &active, issued).await {
                        Ok(pooled) => {
                            ledger.merge(pooled);
                            target = Some(RewardTarget::Pooled(pool));
                        }
                        Err(e) => {
                            warn!(
                                cycle = cycle_number,
                                pool = %pool.id,
                                error = %e,
                                "Pooled allocation failed, routing to reserve"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        cycle = cycle_number,
                        extractor = %extractor,
                        error = %e,
                        "Failed to resolve reward target, routing pooled allocation to reserve"
                    );
                }
            },
        }

        let shares = ledger.into_shares(cycle_number);
        let distributed: f64 = shares.iter().map(|s| s.amount).sum();
        let reserve = (issued - distributed).max(0.0);

        if !shares.is_empty() {
            self.store
                .insert_reward_shares(shares.clone())
                .await
                .map_err(|source| RewardError::PersistShares {
                    cycle: cycle_number,
                    source,
                })?;
        }

        if reserve > 0.0 {
            self.reserve
                .deposit(cycle_number, reserve)
                .await
                .map_err(|source| RewardError::Reserve {
                    cycle: cycle_number,
                    source,
                })?;
        }

        if !shares.is_empty() {
            let credits = shares.iter().map(|s| (s.operator_id, s.amount)).collect();
            self.store
                .apply_rewards(credits)
                .await
                .map_err(|source| RewardError::Apply {
                    cycle: cycle_number,
                    source,
                })?;
        }

        info!(
            cycle = cycle_number,
            issued = issued_amount,
            recipients = shares.len(),
            distributed,
            reserve,
            active_operators = active.len(),
            "Cycle rewards settled"
        );

        Ok(Settlement {
            cycle_number,
            shares,
            reserve,
            target,
            active_operator_count: active.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PoolId, SessionState};
    use crate::store::{MemoryReserve, MemoryStore};
    use chrono::Utc;

    const EPS: f64 = 1e-9;

    struct Fixture {
        store: Arc<MemoryStore>,
        reserve: Arc<MemoryReserve>,
        distributor: RewardDistributor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let reserve = Arc::new(MemoryReserve::new());
        let distributor = RewardDistributor::new(store.clone(), reserve.clone());
        Fixture {
            store,
            reserve,
            distributor,
        }
    }

    async fn active_operator(store: &MemoryStore, id: u64, efficiency: f64) {
        let mut op = Operator::new(OperatorId(id), format!("op-{id}"), 100.0);
        op.cumulative_efficiency = efficiency;
        store.upsert_operator(op);
        store
            .insert_session(OperatorId(id), SessionState::Active, Utc::now())
            .await
            .unwrap();
    }

    fn share_of(settlement: &Settlement, id: u64) -> f64 {
        settlement
            .shares
            .iter()
            .find(|s| s.operator_id == OperatorId(id))
            .map(|s| s.amount)
            .unwrap_or(0.0)
    }

    fn assert_balanced(settlement: &Settlement, issued: f64) {
        let total = settlement.distributed() + settlement.reserve;
        assert!(
            (total - issued).abs() <= issued * 1e-6,
            "shares + reserve = {total}, issued {issued}"
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Solo settlement
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_solo_extractor_scenario() {
        let f = fixture();
        active_operator(&f.store, 1, 30.0).await;
        active_operator(&f.store, 2, 70.0).await;

        let settlement = f.distributor.settle(1, Some(OperatorId(1)), 100).await.unwrap();

        assert!((share_of(&settlement, 1) - 62.0).abs() < EPS);
        assert!((share_of(&settlement, 2) - 28.0).abs() < EPS);
        assert!((settlement.reserve - 10.0).abs() < EPS);
        assert!((f.reserve.deposited_for(1) - 10.0).abs() < EPS);
        assert_eq!(f.reserve.deposits().len(), 1);
        assert_eq!(settlement.target, Some(RewardTarget::Solo));
        assert_eq!(settlement.active_operator_count, 2);
        assert_balanced(&settlement, 100.0);
    }

    #[tokio::test]
    async fn test_rewards_accrue_on_running_session() {
        let f = fixture();
        active_operator(&f.store, 1, 30.0).await;
        active_operator(&f.store, 2, 70.0).await;

        f.distributor.settle(1, Some(OperatorId(1)), 100).await.unwrap();

        let session = f.store.open_session(OperatorId(1)).await.unwrap().unwrap();
        assert!((session.earned_reward - 62.0).abs() < EPS);
        assert_eq!(f.store.operator(OperatorId(1)).unwrap().total_earned_reward, 0.0);
    }

    #[tokio::test]
    async fn test_inactive_extractor_credited_directly() {
        let f = fixture();
        f.store.upsert_operator(Operator::new(OperatorId(9), "idle", 100.0));
        active_operator(&f.store, 2, 70.0).await;

        let settlement = f.distributor.settle(1, Some(OperatorId(9)), 100).await.unwrap();

        assert!((share_of(&settlement, 9) - 50.0).abs() < EPS);
        assert!((share_of(&settlement, 2) - 40.0).abs() < EPS);
        let idle = f.store.operator(OperatorId(9)).unwrap();
        assert!((idle.total_earned_reward - 50.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_ledger_rows_persisted() {
        let f = fixture();
        active_operator(&f.store, 1, 30.0).await;
        active_operator(&f.store, 2, 70.0).await;

        f.distributor.settle(4, Some(OperatorId(2)), 100).await.unwrap();

        let rows = f.store.reward_shares(4);
        assert_eq!(rows.len(), 2);
        let stored = f.store.reward_share(4, OperatorId(2)).await.unwrap().unwrap();
        assert!((stored - (50.0 + 28.0)).abs() < EPS);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // No extractor
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_no_extractor_shares_active_members_fraction() {
        let f = fixture();
        active_operator(&f.store, 1, 25.0).await;
        active_operator(&f.store, 2, 75.0).await;

        let settlement = f.distributor.settle(2, None, 200).await.unwrap();

        assert!((share_of(&settlement, 1) - 20.0).abs() < EPS);
        assert!((share_of(&settlement, 2) - 60.0).abs() < EPS);
        assert!((settlement.reserve - 120.0).abs() < EPS);
        assert!(settlement.target.is_none());
        assert_balanced(&settlement, 200.0);
    }

    #[tokio::test]
    async fn test_no_active_operators_everything_to_reserve() {
        let f = fixture();
        let settlement = f.distributor.settle(3, None, 50).await.unwrap();
        assert!(settlement.shares.is_empty());
        assert!((settlement.reserve - 50.0).abs() < EPS);
        assert_eq!(settlement.active_operator_count, 0);
    }

    #[tokio::test]
    async fn test_zero_efficiency_allocation_goes_to_reserve() {
        let f = fixture();
        active_operator(&f.store, 1, 0.0).await;
        active_operator(&f.store, 2, 0.0).await;

        let settlement = f.distributor.settle(1, Some(OperatorId(1)), 100).await.unwrap();

        assert!((share_of(&settlement, 1) - 50.0).abs() < EPS);
        assert_eq!(share_of(&settlement, 2), 0.0);
        assert_eq!(settlement.shares.len(), 1);
        assert!((settlement.reserve - 50.0).abs() < EPS);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pooled settlement
    // ─────────────────────────────────────────────────────────────────────────

    fn seed_pool(store: &MemoryStore, leader: Option<u64>, members: &[u64]) {
        store.insert_pool(Pool {
            id: PoolId(1),
            leader_operator_id: leader.map(OperatorId),
            reward_split: RewardSplit::new(0.3, 0.1, 0.5),
        });
        for id in members {
            store.join_pool(OperatorId(*id), PoolId(1));
        }
    }

    #[tokio::test]
    async fn test_pooled_extractor_uses_pool_split() {
        let f = fixture();
        active_operator(&f.store, 1, 10.0).await;
        active_operator(&f.store, 2, 30.0).await;
        active_operator(&f.store, 3, 60.0).await;
        f.store.upsert_operator(Operator::new(OperatorId(4), "leader", 100.0));
        seed_pool(&f.store, Some(4), &[1, 2, 4]);

        let settlement = f.distributor.settle(1, Some(OperatorId(1)), 100).await.unwrap();

        // Extractor 30 + member share 50 * 10/40
        assert!((share_of(&settlement, 1) - 42.5).abs() < EPS);
        assert!((share_of(&settlement, 2) - 37.5).abs() < EPS);
        assert_eq!(share_of(&settlement, 3), 0.0);
        assert!((share_of(&settlement, 4) - 10.0).abs() < EPS);
        assert!((settlement.reserve - 10.0).abs() < EPS);
        assert!(matches!(settlement.target, Some(RewardTarget::Pooled(_))));
        assert_balanced(&settlement, 100.0);
    }

    #[tokio::test]
    async fn test_pooled_without_leader_sends_leader_fraction_to_reserve() {
        let f = fixture();
        active_operator(&f.store, 1, 10.0).await;
        active_operator(&f.store, 2, 10.0).await;
        seed_pool(&f.store, None, &[1, 2]);

        let settlement = f.distributor.settle(1, Some(OperatorId(2)), 100).await.unwrap();

        assert!((share_of(&settlement, 2) - 55.0).abs() < EPS);
        assert!((share_of(&settlement, 1) - 25.0).abs() < EPS);
        assert!((settlement.reserve - 20.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_pool_failure_routes_to_reserve() {
        let f = fixture();
        active_operator(&f.store, 1, 10.0).await;
        active_operator(&f.store, 2, 30.0).await;
        seed_pool(&f.store, Some(2), &[1, 2]);
        f.store
            .fail_operation("pool_members", StoreError::Timeout("members".into()));

        let settlement = f.distributor.settle(7, Some(OperatorId(1)), 100).await.unwrap();

        assert!(settlement.shares.is_empty());
        assert!(settlement.target.is_none());
        assert!((settlement.reserve - 100.0).abs() < EPS);
        assert!((f.reserve.deposited_for(7) - 100.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_missing_pool_routes_to_reserve() {
        let f = fixture();
        active_operator(&f.store, 1, 10.0).await;
        f.store.join_pool(OperatorId(1), PoolId(42));

        let settlement = f.distributor.settle(1, Some(OperatorId(1)), 10).await.unwrap();
        assert!(settlement.shares.is_empty());
        assert!((settlement.reserve - 10.0).abs() < EPS);

        let err = f.distributor.resolve_target(OperatorId(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_active_operator_fetch_failure_is_error() {
        let f = fixture();
        f.store
            .fail_operation("running_operators", StoreError::Unavailable("down".into()));

        let err = f.distributor.settle(1, None, 100).await.unwrap_err();
        assert!(matches!(err, RewardError::ActiveOperators { cycle: 1, .. }));
        assert!(err.store_error().is_transient());
        assert!(f.reserve.deposits().is_empty());
    }
}
