//! Cycle engine service facade.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::{create_scheduler, create_sessions, create_watcher, Collaborators};
use super::error::{AdminError, ServiceError};
use crate::config::ConfigFile;
use crate::index::EligibleIndex;
use crate::model::{OperatorId, Session, SessionState};
use crate::scheduler::{CycleScheduler, CycleStatusSnapshot};
use crate::session::{SessionError, SessionLifecycle};
use crate::store::{keys, CounterCache, RecordStore};

/// Per-operator view of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleExtendedData {
    pub cycle_number: u64,
    pub finalized: bool,
    pub extractor_operator_id: Option<OperatorId>,
    pub extractor_display_name: Option<String>,
    /// The requesting operator's share of the cycle.
    pub operator_share: Option<f64>,
    /// The extractor's share of the cycle.
    pub extractor_share: Option<f64>,
}

/// High-level facade over the cycle engine.
///
/// Wires every component from a [`ConfigFile`] and a set of
/// [`Collaborators`], and exposes the operations the request layer calls.
///
/// # Example
///
/// ```no_run
/// use drillcycle::config::ConfigFile;
/// use drillcycle::service::{Collaborators, CycleService};
///
/// # async fn demo() -> Result<(), drillcycle::service::ServiceError> {
/// let service = CycleService::new(&ConfigFile::default(), Collaborators::in_memory())?;
/// service.run(Some(3)).await?;
/// println!("{}", service.cycle_status().cycle_line());
/// # Ok(())
/// # }
/// ```
pub struct CycleService {
    config: ConfigFile,
    collaborators: Collaborators,
    index: Arc<EligibleIndex>,
    sessions: Arc<SessionLifecycle>,
    scheduler: Arc<CycleScheduler>,
    shutdown: CancellationToken,
}

impl CycleService {
    /// Validates the configuration and wires all components.
    pub fn new(config: &ConfigFile, collaborators: Collaborators) -> Result<Self, ServiceError> {
        config.validate()?;

        let index = Arc::new(EligibleIndex::new());
        let sessions = create_sessions(config, &collaborators);
        let scheduler = Arc::new(create_scheduler(config, &collaborators, &index, &sessions));

        Ok(Self {
            config: config.clone(),
            collaborators,
            index,
            sessions,
            scheduler,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn scheduler(&self) -> Arc<CycleScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn index(&self) -> Arc<EligibleIndex> {
        Arc::clone(&self.index)
    }

    /// Token that stops [`CycleService::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn store(&self) -> &dyn RecordStore {
        self.collaborators.store.as_ref()
    }

    fn counters(&self) -> &dyn CounterCache {
        self.collaborators.counters.as_ref()
    }

    /// Runs the engine until shutdown or until `max_ticks` cycle boundaries
    /// were processed.
    ///
    /// Loads the eligible index, starts the index watcher, then drives the
    /// scheduler. The watcher is stopped before returning.
    pub async fn run(&self, max_ticks: Option<u64>) -> Result<(), ServiceError> {
        let watcher = create_watcher(&self.config, &self.collaborators, &self.index);
        let drills = self.index.load(self.store()).await?;
        if let Err(e) = self.sessions.recalibrate().await {
            warn!(error = %e, "Initial session counter recalibration failed");
        }

        let watcher_token = self.shutdown.child_token();
        let watcher_task = tokio::spawn(watcher.run(watcher_token.clone()));

        info!(drills, max_ticks = ?max_ticks, "Cycle service started");
        Arc::clone(&self.scheduler)
            .run_until(self.shutdown.clone(), max_ticks)
            .await;

        watcher_token.cancel();
        if let Err(e) = watcher_task.await {
            warn!(error = %e, "Index watcher task failed");
        }
        info!("Cycle service stopped");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Current cycle number.
    ///
    /// Falls back to the last number the scheduler recorded when the counter
    /// cache is unreachable.
    pub async fn current_cycle_number(&self) -> Option<u64> {
        match self.counters().get(keys::CYCLE_COUNTER).await {
            Ok(Some(n)) => Some(n),
            Ok(None) => self.scheduler.status().snapshot().current_cycle,
            Err(e) => {
                warn!(error = %e, "Cycle counter unavailable, using last known cycle");
                self.scheduler.status().snapshot().current_cycle
            }
        }
    }

    /// Best-effort status snapshot.
    pub fn cycle_status(&self) -> CycleStatusSnapshot {
        let mut snapshot = self.scheduler.status().snapshot();
        snapshot.scheduling_enabled = self.scheduler.is_enabled();
        snapshot.eligible_drills = self.index.len();
        snapshot
    }

    /// Extractor name and reward shares of one cycle, from `operator`'s view.
    pub async fn cycle_extended_data(
        &self,
        cycle_number: u64,
        operator: OperatorId,
    ) -> Result<CycleExtendedData, ServiceError> {
        let cycle = self
            .store()
            .get_cycle(cycle_number)
            .await?
            .ok_or(ServiceError::CycleNotFound(cycle_number))?;

        let operator_share = self.store().reward_share(cycle_number, operator).await?;

        let (extractor_display_name, extractor_share) = match cycle.extractor_operator_id {
            Some(extractor) => {
                let name = self
                    .store()
                    .get_operator(extractor)
                    .await?
                    .map(|op| op.display_name);
                let share = self.store().reward_share(cycle_number, extractor).await?;
                (name, share)
            }
            None => (None, None),
        };

        Ok(CycleExtendedData {
            cycle_number,
            finalized: cycle.finalized,
            extractor_operator_id: cycle.extractor_operator_id,
            extractor_display_name,
            operator_share,
            extractor_share,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_session(&self, operator: OperatorId) -> Result<Session, SessionError> {
        self.sessions.create(operator, Utc::now()).await
    }

    pub async fn request_stop(&self, operator: OperatorId) -> Result<SessionState, SessionError> {
        self.sessions.request_stop(operator).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin
    // ─────────────────────────────────────────────────────────────────────────

    fn authorize(&self, secret: &str) -> Result<(), AdminError> {
        match self.config.admin.secret.as_deref() {
            Some(expected) if expected == secret => Ok(()),
            _ => {
                warn!("Rejected admin request");
                Err(AdminError::Forbidden)
            }
        }
    }

    /// Enables or suspends scheduling. Never interrupts an in-flight
    /// boundary.
    pub fn toggle_scheduling(&self, secret: &str, enabled: bool) -> Result<(), AdminError> {
        self.authorize(secret)?;
        self.scheduler.set_enabled(enabled);
        Ok(())
    }

    /// Forces the cycle counter to `value`.
    pub async fn reset_counter(&self, secret: &str, value: u64) -> Result<(), AdminError> {
        self.authorize(secret)?;
        self.scheduler.reset_counter(value).await?;
        Ok(())
    }
}
