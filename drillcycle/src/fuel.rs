//! Fuel economy.
//!
//! Once per finalized cycle every running operator burns the same amount of
//! fuel and every idle operator below capacity regains the same amount.
//! Running operators that hit the depletion threshold have their session
//! force-closed in the same pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::model::{ClosedSession, FuelLevel, OperatorId};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::random::RandomSource;
use crate::session::release_closed_sessions;
use crate::store::{CounterCache, RecordStore, StoreResult};

/// Default minimum fuel burned per cycle by a running operator.
pub const DEFAULT_DEPLETION_MIN: f64 = 1.0;

/// Default maximum fuel burned per cycle by a running operator.
pub const DEFAULT_DEPLETION_MAX: f64 = 5.0;

/// Default minimum fuel regained per cycle by an idle operator.
pub const DEFAULT_REGEN_MIN: f64 = 1.0;

/// Default maximum fuel regained per cycle by an idle operator.
pub const DEFAULT_REGEN_MAX: f64 = 3.0;

/// Default fuel level at or below which a running session is closed.
pub const DEFAULT_DEPLETION_THRESHOLD: f64 = 0.0;

/// Per-cycle fuel draw bounds and the forced-stop threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelPolicy {
    pub depletion_min: f64,
    pub depletion_max: f64,
    pub regen_min: f64,
    pub regen_max: f64,
    pub depletion_threshold: f64,
}

impl Default for FuelPolicy {
    fn default() -> Self {
        Self {
            depletion_min: DEFAULT_DEPLETION_MIN,
            depletion_max: DEFAULT_DEPLETION_MAX,
            regen_min: DEFAULT_REGEN_MIN,
            regen_max: DEFAULT_REGEN_MAX,
            depletion_threshold: DEFAULT_DEPLETION_THRESHOLD,
        }
    }
}

/// Outcome of one fuel tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuelReport {
    pub fuel_used: f64,
    pub fuel_gained: f64,
    /// Resulting levels of running operators.
    pub depleted: Vec<FuelLevel>,
    /// Resulting levels of idle operators that regained fuel.
    pub replenished: Vec<FuelLevel>,
    /// Sessions force-closed because their operator ran dry.
    pub closed: Vec<ClosedSession>,
}

/// Bulk fuel depletion and replenishment.
pub struct FuelEconomy {
    store: Arc<dyn RecordStore>,
    counters: Arc<dyn CounterCache>,
    notifier: Arc<dyn NotificationSink>,
    policy: FuelPolicy,
    rng: RandomSource,
}

impl FuelEconomy {
    pub fn new(
        store: Arc<dyn RecordStore>,
        counters: Arc<dyn CounterCache>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            counters,
            notifier,
            policy: FuelPolicy::default(),
            rng: RandomSource::new(None),
        }
    }

    pub fn with_policy(mut self, policy: FuelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seeds the fuel draws.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.rng = RandomSource::new(seed);
        self
    }

    pub fn policy(&self) -> FuelPolicy {
        self.policy
    }

    /// Draws this tick's `(fuel_used, fuel_gained)`.
    ///
    /// NaN draws fall back to `depletion_max` and `regen_min`.
    fn draw(&self) -> (f64, f64) {
        let p = &self.policy;
        let mut used = self.rng.uniform(p.depletion_min, p.depletion_max);
        if used.is_nan() {
            used = p.depletion_max;
        }
        let mut gained = self.rng.uniform(p.regen_min, p.regen_max);
        if gained.is_nan() {
            gained = p.regen_min;
        }
        (used.max(0.0), gained.max(0.0))
    }

    /// Runs one fuel tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> StoreResult<FuelReport> {
        let running: Vec<OperatorId> = self
            .store
            .running_operators()
            .await?
            .into_iter()
            .map(|op| op.id)
            .collect();

        let (fuel_used, fuel_gained) = self.draw();

        let depleted = if running.is_empty() {
            Vec::new()
        } else {
            self.store.deplete_fuel(running.clone(), fuel_used).await?
        };
        let replenished = self.store.replenish_fuel(running.clone(), fuel_gained).await?;

        let dry = if running.is_empty() {
            Vec::new()
        } else {
            self.store
                .operators_at_or_below_fuel(running, self.policy.depletion_threshold)
                .await?
        };

        let closed = if dry.is_empty() {
            Vec::new()
        } else {
            self.store.close_sessions(dry, now).await?
        };
        release_closed_sessions(self.counters.as_ref(), &closed).await;

        for session in &closed {
            warn!(
                operator = %session.operator_id,
                session = %session.session_id,
                earned = session.earned_reward,
                "Session closed: out of fuel"
            );
        }

        let mut depleted_intent =
            Notification::fuel(NotificationKind::FuelDepleted, fuel_used, &depleted);
        depleted_intent.payload["closed"] =
            json!(closed.iter().map(|s| s.operator_id).collect::<Vec<_>>());
        self.notifier.notify(depleted_intent);
        self.notifier.notify(Notification::fuel(
            NotificationKind::FuelReplenished,
            fuel_gained,
            &replenished,
        ));

        info!(
            fuel_used,
            fuel_gained,
            depleted = depleted.len(),
            replenished = replenished.len(),
            closed = closed.len(),
            "Fuel tick complete"
        );

        Ok(FuelReport {
            fuel_used,
            fuel_gained,
            depleted,
            replenished,
            closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operator, SessionState};
    use crate::notify::ChannelNotifier;
    use crate::store::{keys, MemoryCounters, MemoryStore, StoreError};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        store: Arc<MemoryStore>,
        counters: Arc<MemoryCounters>,
        rx: UnboundedReceiver<Notification>,
        economy: FuelEconomy,
    }

    fn fixture(policy: FuelPolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let counters = Arc::new(MemoryCounters::new());
        let (notifier, rx) = ChannelNotifier::channel();
        let economy = FuelEconomy::new(store.clone(), counters.clone(), Arc::new(notifier))
            .with_policy(policy)
            .with_seed(Some(11));
        Fixture {
            store,
            counters,
            rx,
            economy,
        }
    }

    fn fixed(used: f64, gained: f64, threshold: f64) -> FuelPolicy {
        FuelPolicy {
            depletion_min: used,
            depletion_max: used,
            regen_min: gained,
            regen_max: gained,
            depletion_threshold: threshold,
        }
    }

    async fn seed_operator(f: &Fixture, id: u64, fuel: f64, max: f64, running: bool) {
        let mut op = Operator::new(OperatorId(id), format!("op-{id}"), max);
        op.current_fuel = fuel;
        f.store.upsert_operator(op);
        if running {
            f.store
                .insert_session(OperatorId(id), SessionState::Active, Utc::now())
                .await
                .unwrap();
            f.counters.incr(keys::ACTIVE_SESSIONS).await.unwrap();
            f.counters
                .put_entry(&keys::session_entry(OperatorId(id)), "active".into())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_running_operators_burn_idle_operators_regain() {
        let mut f = fixture(fixed(4.0, 2.0, 0.0));
        seed_operator(&f, 1, 50.0, 100.0, true).await;
        seed_operator(&f, 2, 50.0, 100.0, false).await;
        seed_operator(&f, 3, 100.0, 100.0, false).await;

        let report = f.economy.tick(Utc::now()).await.unwrap();

        assert_eq!(report.fuel_used, 4.0);
        assert_eq!(report.fuel_gained, 2.0);
        assert_eq!(f.store.operator(OperatorId(1)).unwrap().current_fuel, 46.0);
        assert_eq!(f.store.operator(OperatorId(2)).unwrap().current_fuel, 52.0);
        assert_eq!(f.store.operator(OperatorId(3)).unwrap().current_fuel, 100.0);
        assert_eq!(report.replenished.len(), 1);
        assert!(report.closed.is_empty());

        let depleted = f.rx.recv().await.unwrap();
        assert_eq!(depleted.kind, NotificationKind::FuelDepleted);
        assert_eq!(depleted.operator_ids, vec![OperatorId(1)]);
        assert_eq!(depleted.payload["delta"], 4.0);
        let replenished = f.rx.recv().await.unwrap();
        assert_eq!(replenished.kind, NotificationKind::FuelReplenished);
        assert_eq!(replenished.operator_ids, vec![OperatorId(2)]);
    }

    #[tokio::test]
    async fn test_fuel_stays_within_bounds() {
        let f = fixture(FuelPolicy {
            depletion_min: 10.0,
            depletion_max: 40.0,
            regen_min: 10.0,
            regen_max: 40.0,
            depletion_threshold: -1.0,
        });
        seed_operator(&f, 1, 15.0, 50.0, true).await;
        seed_operator(&f, 2, 45.0, 50.0, false).await;

        for _ in 0..20 {
            f.economy.tick(Utc::now()).await.unwrap();
            for op in f.store.operators() {
                assert!(op.current_fuel >= 0.0 && op.current_fuel <= op.max_fuel);
            }
        }
        assert_eq!(f.store.operator(OperatorId(1)).unwrap().current_fuel, 0.0);
        assert_eq!(f.store.operator(OperatorId(2)).unwrap().current_fuel, 50.0);
    }

    #[tokio::test]
    async fn test_depleted_session_force_closed() {
        let f = fixture(fixed(10.0, 1.0, 0.0));
        seed_operator(&f, 1, 8.0, 100.0, true).await;
        seed_operator(&f, 2, 80.0, 100.0, true).await;
        f.store
            .apply_rewards(vec![(OperatorId(1), 12.5)])
            .await
            .unwrap();

        let report = f.economy.tick(Utc::now()).await.unwrap();

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].operator_id, OperatorId(1));
        assert_eq!(report.closed[0].earned_reward, 12.5);

        let op = f.store.operator(OperatorId(1)).unwrap();
        assert_eq!(op.current_fuel, 0.0);
        assert_eq!(op.total_earned_reward, 12.5);
        assert!(f.store.open_session(OperatorId(1)).await.unwrap().is_none());
        assert!(f.store.open_session(OperatorId(2)).await.unwrap().is_some());

        assert_eq!(f.counters.value(keys::ACTIVE_SESSIONS), Some(1));
        assert!(f.counters.entry(&keys::session_entry(OperatorId(1))).is_none());
        assert!(f.counters.entry(&keys::session_entry(OperatorId(2))).is_some());
    }

    #[tokio::test]
    async fn test_closed_operators_listed_in_depleted_intent() {
        let mut f = fixture(fixed(10.0, 1.0, 0.0));
        seed_operator(&f, 1, 5.0, 100.0, true).await;

        f.economy.tick(Utc::now()).await.unwrap();

        let depleted = f.rx.recv().await.unwrap();
        assert_eq!(depleted.payload["closed"][0], 1);
        assert_eq!(depleted.payload["levels"][0]["current_fuel"], 0.0);
    }

    #[tokio::test]
    async fn test_nan_draws_fall_back() {
        let f = fixture(FuelPolicy {
            depletion_min: f64::NAN,
            depletion_max: 3.0,
            regen_min: 2.0,
            regen_max: f64::NAN,
            depletion_threshold: 0.0,
        });
        let (used, gained) = f.economy.draw();
        assert_eq!(used, 3.0);
        assert_eq!(gained, 2.0);
    }

    #[tokio::test]
    async fn test_no_running_operators_only_replenishes() {
        let f = fixture(fixed(5.0, 5.0, 0.0));
        seed_operator(&f, 1, 10.0, 100.0, false).await;

        let report = f.economy.tick(Utc::now()).await.unwrap();
        assert!(report.depleted.is_empty());
        assert_eq!(report.replenished[0].current_fuel, 15.0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let f = fixture(FuelPolicy::default());
        f.store
            .fail_operation("running_operators", StoreError::Timeout("slow".into()));
        let err = f.economy.tick(Utc::now()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
