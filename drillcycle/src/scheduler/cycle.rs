//! The cycle scheduler.
//!
//! # Boundary sequence
//!
//! On each tick while scheduling is enabled:
//! 1. Increment the cycle counter and compute the issuance
//! 2. Persist the new cycle row (verifying on failure, reconciling the
//!    counter if the row really is missing)
//! 3. Activate WAITING sessions
//! 4. Retry earlier cycles whose finalization failed
//! 5. Finalize the previous cycle: select the extractor, settle rewards,
//!    run the fuel tick, complete STOPPING sessions, mark the row finalized
//! 6. Every `recalibrate_every` cycles, recalibrate the session counter
//!
//! The run loop awaits the whole sequence before waiting for the next tick,
//! so boundaries never overlap.
//!
//! # Finalization checkpoints
//!
//! The pass records [`FinalizeStage::Settled`] once rewards are persisted and
//! [`FinalizeStage::Fueled`] once the fuel tick has run. A pass that fails
//! part way resumes from the last checkpoint, so no cycle is paid or
//! depleted twice. A pass that outlives `finalize_timeout` is logged and
//! awaited, never dropped mid-write.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SchedulerError;
use super::issuance::{issuance, DEFAULT_EPOCH_LENGTH, DEFAULT_GENESIS_ISSUANCE};
use super::status::{FinalizedSummary, SchedulerPhase, SharedCycleStatus};
use crate::fuel::{FuelEconomy, FuelReport};
use crate::index::EligibleIndex;
use crate::model::{ClosedSession, Cycle, CycleOutcome, FinalizeStage, OperatorId, RewardShare};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::rewards::{RewardDistributor, Settlement};
use crate::selector::{Extraction, ExtractorSelector};
use crate::session::SessionLifecycle;
use crate::store::{keys, CounterCache, RecordStore, StoreResult};

/// Default cycle duration (10 minutes).
pub const DEFAULT_CYCLE_DURATION_SECS: u64 = 600;

/// Default number of cycles between session counter recalibrations.
pub const DEFAULT_RECALIBRATE_EVERY: u64 = 10;

/// Default duration after which a finalization pass is reported as slow.
pub const DEFAULT_FINALIZE_TIMEOUT_SECS: u64 = 120;

/// Static schedule parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// Length of a cycle; also the default tick interval.
    pub cycle_duration: Duration,
    pub genesis: u64,
    pub epoch_length: u64,
    /// `0` disables periodic recalibration.
    pub recalibrate_every: u64,
    pub finalize_timeout: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            cycle_duration: Duration::from_secs(DEFAULT_CYCLE_DURATION_SECS),
            genesis: DEFAULT_GENESIS_ISSUANCE,
            epoch_length: DEFAULT_EPOCH_LENGTH,
            recalibrate_every: DEFAULT_RECALIBRATE_EVERY,
            finalize_timeout: Duration::from_secs(DEFAULT_FINALIZE_TIMEOUT_SECS),
        }
    }
}

/// Components the scheduler sequences at each boundary.
pub struct SchedulerParts {
    pub store: Arc<dyn RecordStore>,
    pub counters: Arc<dyn CounterCache>,
    pub index: Arc<EligibleIndex>,
    pub selector: ExtractorSelector,
    pub rewards: RewardDistributor,
    pub fuel: FuelEconomy,
    pub sessions: Arc<SessionLifecycle>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Result of finalizing one cycle.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub cycle_number: u64,
    pub extraction: Option<Extraction>,
    pub settlement: Settlement,
    pub fuel: FuelReport,
    pub completed: Vec<ClosedSession>,
    /// Whether the pass resumed from a checkpoint left by a failed pass.
    /// `extraction` is `None` then; the cycle row holds the extractor.
    pub resumed: bool,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub cycle_number: u64,
    pub issued_amount: u64,
    pub activated: Vec<OperatorId>,
    /// `None` for the first cycle, an already-finalized previous cycle, or a
    /// failed finalization pass.
    pub finalized: Option<FinalizeReport>,
    /// Earlier cycles finalized by retrying a failed pass.
    pub recovered: Vec<u64>,
}

/// Fixed-interval orchestrator of cycle boundaries.
pub struct CycleScheduler {
    store: Arc<dyn RecordStore>,
    counters: Arc<dyn CounterCache>,
    index: Arc<EligibleIndex>,
    selector: ExtractorSelector,
    rewards: RewardDistributor,
    fuel: FuelEconomy,
    sessions: Arc<SessionLifecycle>,
    notifier: Arc<dyn NotificationSink>,
    status: Arc<SharedCycleStatus>,
    schedule: Schedule,
    tick_interval: Duration,
    enabled: AtomicBool,
    unfinalized: Mutex<BTreeSet<u64>>,
}

impl CycleScheduler {
    pub fn new(parts: SchedulerParts) -> Self {
        let schedule = Schedule::default();
        let status = SharedCycleStatus::new();
        status.update_enabled(true);
        Self {
            store: parts.store,
            counters: parts.counters,
            index: parts.index,
            selector: parts.selector,
            rewards: parts.rewards,
            fuel: parts.fuel,
            sessions: parts.sessions,
            notifier: parts.notifier,
            status,
            tick_interval: schedule.cycle_duration,
            schedule,
            enabled: AtomicBool::new(true),
            unfinalized: Mutex::new(BTreeSet::new()),
        }
    }

    /// Sets the schedule; the tick interval follows the cycle duration.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.tick_interval = schedule.cycle_duration;
        self.schedule = schedule;
        self
    }

    /// Overrides the tick interval without changing recorded cycle bounds.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn status(&self) -> Arc<SharedCycleStatus> {
        Arc::clone(&self.status)
    }

    pub fn sessions(&self) -> Arc<SessionLifecycle> {
        Arc::clone(&self.sessions)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin controls
    // ─────────────────────────────────────────────────────────────────────────

    /// Enables or suspends future ticks. An in-flight boundary completes.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        self.status.update_enabled(enabled);
        if was != enabled {
            info!(enabled, "Cycle scheduling toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Forces the cycle counter to `value`. The next tick creates `value + 1`.
    pub async fn reset_counter(&self, value: u64) -> StoreResult<()> {
        let previous = self.counters.get(keys::CYCLE_COUNTER).await?;
        self.counters.set(keys::CYCLE_COUNTER, value).await?;
        self.status.update_current(value);
        warn!(previous = ?previous, value, "Cycle counter reset");
        Ok(())
    }

    /// Current value of the cycle counter.
    pub async fn current_cycle_number(&self) -> StoreResult<Option<u64>> {
        self.counters.get(keys::CYCLE_COUNTER).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Aligns the cycle counter with the durable maximum cycle number.
    ///
    /// Gaps in the durable sequence are reported, never repaired. Returns the
    /// durable maximum (0 when no cycle exists).
    pub async fn reconcile_counter(&self) -> StoreResult<u64> {
        let durable = self.store.max_cycle_number().await?.unwrap_or(0);
        let rows = self.store.cycle_count().await?;
        if rows != durable {
            warn!(
                durable_max = durable,
                rows,
                missing = durable.saturating_sub(rows),
                "Gaps in durable cycle sequence"
            );
        }

        let cached = self.counters.get(keys::CYCLE_COUNTER).await?;
        if cached == Some(durable) {
            debug!(cycle = durable, "Cycle counter in sync");
        } else {
            warn!(
                cached = ?cached,
                durable_max = durable,
                "Cycle counter out of sync, resetting to durable maximum"
            );
            self.counters.set(keys::CYCLE_COUNTER, durable).await?;
        }

        if durable > 0 {
            self.status.update_current(durable);
        }
        Ok(durable)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Boundary processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Processes one cycle boundary at `now`.
    ///
    /// Finalization failures of the previous cycle are logged and reported
    /// as `finalized: None`; only failing to create the new cycle is an
    /// error.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickOutcome, SchedulerError> {
        self.status.update_phase(SchedulerPhase::Starting);
        let result = self.advance(now).await;
        self.status.record_tick(now, result.is_ok());
        self.status.update_phase(SchedulerPhase::Idle);
        self.refresh_gauges().await;
        result
    }

    async fn advance(&self, now: DateTime<Utc>) -> Result<TickOutcome, SchedulerError> {
        let cycle_number = self
            .counters
            .incr(keys::CYCLE_COUNTER)
            .await
            .map_err(SchedulerError::Counter)?;
        let issued_amount = issuance(
            cycle_number,
            self.schedule.genesis,
            self.schedule.epoch_length,
        );
        let end_time = now
            + chrono::Duration::from_std(self.schedule.cycle_duration)
                .unwrap_or_else(|_| chrono::Duration::zero());

        self.persist_cycle(Cycle::open(cycle_number, now, end_time, issued_amount))
            .await?;
        self.status.update_current(cycle_number);

        info!(cycle = cycle_number, issued = issued_amount, "Cycle started");
        self.notifier.notify(Notification::new(
            NotificationKind::CycleStarted,
            Vec::new(),
            json!({
                "cycle": cycle_number,
                "start_time": now,
                "end_time": end_time,
                "issued_amount": issued_amount,
            }),
        ));

        let activated = match self.sessions.activate_waiting(cycle_number, now).await {
            Ok(activated) => activated,
            Err(e) => {
                warn!(cycle = cycle_number, error = %e, "Failed to activate waiting sessions");
                Vec::new()
            }
        };

        let (recovered, finalized) = if cycle_number > 1 {
            let recovered = self.retry_unfinalized(cycle_number - 1, now).await;
            (recovered, self.finalize_guarded(cycle_number - 1, now).await)
        } else {
            (Vec::new(), None)
        };

        let every = self.schedule.recalibrate_every;
        if every > 0 && cycle_number % every == 0 {
            if let Err(e) = self.sessions.recalibrate().await {
                warn!(cycle = cycle_number, error = %e, "Session counter recalibration failed");
            }
        }

        Ok(TickOutcome {
            cycle_number,
            issued_amount,
            activated,
            finalized,
            recovered,
        })
    }

    /// Inserts the cycle row, distinguishing a lost acknowledgement from a
    /// real failure.
    async fn persist_cycle(&self, cycle: Cycle) -> Result<(), SchedulerError> {
        let cycle_number = cycle.cycle_number;
        let start_time = cycle.start_time;

        let Err(insert_err) = self.store.insert_cycle(cycle).await else {
            return Ok(());
        };

        match self.store.get_cycle(cycle_number).await {
            Ok(Some(existing)) if existing.start_time == start_time => {
                warn!(
                    cycle = cycle_number,
                    error = %insert_err,
                    "Cycle insert reported failure but the row exists, continuing"
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(cycle = cycle_number, error = %e, "Failed to verify cycle row");
            }
        }

        error!(cycle = cycle_number, error = %insert_err, "Failed to persist cycle");
        if let Err(e) = self.reconcile_counter().await {
            warn!(error = %e, "Counter reconciliation after failed insert also failed");
        }
        Err(SchedulerError::PersistCycle {
            cycle: cycle_number,
            source: insert_err,
        })
    }

    /// Cycles whose finalization failed and will be retried.
    pub fn unfinalized_cycles(&self) -> Vec<u64> {
        self.unfinalized.lock().iter().copied().collect()
    }

    /// Retries failed passes for cycles before `current`.
    async fn retry_unfinalized(&self, current: u64, now: DateTime<Utc>) -> Vec<u64> {
        let pending: Vec<u64> = self.unfinalized.lock().range(..current).copied().collect();
        let mut recovered = Vec::new();
        for cycle_number in pending {
            info!(cycle = cycle_number, "Retrying cycle finalization");
            if self.finalize_guarded(cycle_number, now).await.is_some() {
                recovered.push(cycle_number);
            }
        }
        recovered
    }

    /// Finalizes with new sessions queued, logging failures and remembering
    /// the cycle for a retry at a later boundary.
    async fn finalize_guarded(
        &self,
        cycle_number: u64,
        now: DateTime<Utc>,
    ) -> Option<FinalizeReport> {
        self.sessions.set_finalizing(true);
        self.status.update_phase(SchedulerPhase::Finalizing);

        let limit = self.schedule.finalize_timeout;
        let pass = self.finalize(cycle_number, now);
        tokio::pin!(pass);
        let result = match tokio::time::timeout(limit, &mut pass).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    cycle = cycle_number,
                    timeout_secs = limit.as_secs(),
                    "Cycle finalization is slow, waiting for it to finish"
                );
                pass.await
            }
        };

        self.sessions.set_finalizing(false);

        match result {
            Ok(report) => {
                self.unfinalized.lock().remove(&cycle_number);
                report
            }
            Err(e) => {
                error!(
                    cycle = cycle_number,
                    transient = e.is_transient(),
                    error = %e,
                    "Cycle finalization failed"
                );
                let mut unfinalized = self.unfinalized.lock();
                if matches!(e, SchedulerError::CycleNotFound(_)) {
                    unfinalized.remove(&cycle_number);
                } else {
                    unfinalized.insert(cycle_number);
                }
                None
            }
        }
    }

    /// Settles `cycle_number`, resuming from the checkpoint a failed pass
    /// left behind.
    ///
    /// Returns `Ok(None)` if the cycle was already finalized.
    pub async fn finalize(
        &self,
        cycle_number: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<FinalizeReport>, SchedulerError> {
        let cycle = self
            .store
            .get_cycle(cycle_number)
            .await?
            .ok_or(SchedulerError::CycleNotFound(cycle_number))?;
        if cycle.finalized {
            debug!(cycle = cycle_number, "Cycle already finalized, skipping");
            return Ok(None);
        }

        let resumed = cycle.stage > FinalizeStage::Pending;
        let (extraction, settlement, outcome) = if resumed {
            info!(
                cycle = cycle_number,
                stage = ?cycle.stage,
                "Resuming cycle finalization from checkpoint"
            );
            let shares = self.store.cycle_reward_shares(cycle_number).await?;
            let settlement = stored_settlement(&cycle, shares, cycle.active_operator_count);
            (None, settlement, outcome_of(&cycle))
        } else {
            self.settle(&cycle).await?
        };

        let fuel = if cycle.stage < FinalizeStage::Fueled {
            let fuel = self.fuel.tick(now).await?;
            self.store
                .advance_stage(cycle_number, FinalizeStage::Fueled)
                .await?;
            fuel
        } else {
            FuelReport::default()
        };
        let completed = self.sessions.complete_stopping(cycle_number, now).await?;

        if !self.store.finalize_cycle(cycle_number).await? {
            // Another writer finalized it while this pass ran.
            warn!(cycle = cycle_number, "Cycle was finalized concurrently");
        }

        let summary = FinalizedSummary {
            cycle_number,
            extractor_drill_id: outcome.extractor_drill_id,
            extractor_operator_id: outcome.extractor_operator_id,
            issued_amount: cycle.issued_amount,
            distributed: settlement.distributed(),
            reserve: settlement.reserve,
            active_operator_count: settlement.active_operator_count,
            closed_sessions: fuel.closed.len() + completed.len(),
        };
        self.notifier.notify(Notification::new(
            NotificationKind::CycleFinalized,
            settlement.shares.iter().map(|s| s.operator_id).collect(),
            json!(summary),
        ));
        self.status.update_finalized(summary);

        info!(
            cycle = cycle_number,
            distributed = settlement.distributed(),
            reserve = settlement.reserve,
            force_closed = fuel.closed.len(),
            completed = completed.len(),
            resumed,
            "Cycle finalized"
        );

        Ok(Some(FinalizeReport {
            cycle_number,
            extraction,
            settlement,
            fuel,
            completed,
            resumed,
        }))
    }

    /// Selects the extractor, pays out the issuance and checkpoints the row.
    async fn settle(
        &self,
        cycle: &Cycle,
    ) -> Result<(Option<Extraction>, Settlement, CycleOutcome), SchedulerError> {
        let cycle_number = cycle.cycle_number;

        let persisted = self.store.cycle_reward_shares(cycle_number).await?;
        if !persisted.is_empty() {
            // Shares landed but the checkpoint did not; the extractor is lost.
            warn!(
                cycle = cycle_number,
                shares = persisted.len(),
                "Reward shares already persisted, not settling again"
            );
            let settlement = stored_settlement(cycle, persisted, 0);
            let outcome = CycleOutcome {
                extractor_drill_id: None,
                extractor_operator_id: None,
                active_operator_count: 0,
                total_weighted_efficiency: 0.0,
            };
            self.store
                .record_settlement(cycle_number, outcome.clone())
                .await?;
            return Ok((None, settlement, outcome));
        }

        let snapshot = self.index.snapshot();
        let extraction = self.selector.select(&snapshot);
        match &extraction {
            Some(e) => info!(
                cycle = cycle_number,
                drill = %e.drill_id,
                operator = %e.owner_operator_id,
                total_weight = e.total_weight,
                candidates = snapshot.len(),
                "Extractor selected"
            ),
            None => info!(cycle = cycle_number, candidates = snapshot.len(), "No extractor"),
        }

        let settlement = self
            .rewards
            .settle(
                cycle_number,
                extraction.map(|e| e.owner_operator_id),
                cycle.issued_amount,
            )
            .await?;

        let outcome = CycleOutcome {
            extractor_drill_id: extraction.map(|e| e.drill_id),
            extractor_operator_id: extraction.map(|e| e.owner_operator_id),
            active_operator_count: settlement.active_operator_count,
            total_weighted_efficiency: extraction.map(|e| e.total_weight).unwrap_or(0.0),
        };
        self.store
            .record_settlement(cycle_number, outcome.clone())
            .await?;
        Ok((extraction, settlement, outcome))
    }

    async fn refresh_gauges(&self) {
        let active = match self.counters.get(keys::ACTIVE_SESSIONS).await {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Active session counter unavailable");
                None
            }
        };
        self.status.update_gauges(self.index.len(), active);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs until shutdown is signalled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.run_until(shutdown, None).await
    }

    /// Runs until shutdown, or until `max_ticks` boundaries were processed.
    ///
    /// The first tick fires immediately. Ticks skipped while scheduling is
    /// disabled do not count.
    pub async fn run_until(
        self: Arc<Self>,
        shutdown: CancellationToken,
        max_ticks: Option<u64>,
    ) {
        info!(
            interval_secs = self.tick_interval.as_secs_f64(),
            cycle_duration_secs = self.schedule.cycle_duration.as_secs(),
            genesis = self.schedule.genesis,
            epoch_length = self.schedule.epoch_length,
            "Cycle scheduler starting"
        );

        if let Err(e) = self.reconcile_counter().await {
            warn!(error = %e, "Startup counter reconciliation failed");
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut processed = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Cycle scheduler shutting down");
                    break;
                }

                _ = interval.tick() => {
                    if !self.is_enabled() {
                        debug!("Scheduling disabled, skipping tick");
                        self.status.update_phase(SchedulerPhase::Paused);
                        continue;
                    }

                    match self.tick(Utc::now()).await {
                        Ok(outcome) => debug!(cycle = outcome.cycle_number, "Tick complete"),
                        Err(e) => {
                            error!(transient = e.is_transient(), error = %e, "Cycle tick failed")
                        }
                    }

                    processed += 1;
                    if max_ticks.is_some_and(|max| processed >= max) {
                        info!(ticks = processed, "Tick limit reached, scheduler stopping");
                        break;
                    }
                }
            }
        }

        self.status.update_phase(SchedulerPhase::Stopped);
    }
}

/// Rebuilds a settlement from ledger rows persisted by an earlier pass.
fn stored_settlement(cycle: &Cycle, shares: Vec<RewardShare>, active: u64) -> Settlement {
    let distributed: f64 = shares.iter().map(|s| s.amount).sum();
    Settlement {
        cycle_number: cycle.cycle_number,
        reserve: (cycle.issued_amount as f64 - distributed).max(0.0),
        shares,
        target: None,
        active_operator_count: active,
    }
}

fn outcome_of(cycle: &Cycle) -> CycleOutcome {
    CycleOutcome {
        extractor_drill_id: cycle.extractor_drill_id,
        extractor_operator_id: cycle.extractor_operator_id,
        active_operator_count: cycle.active_operator_count,
        total_weighted_efficiency: cycle.total_weighted_efficiency,
    }
}
