//! Session lifecycle.
//!
//! ```text
//! NONE ──create──▶ ACTIVE ──request_stop──▶ STOPPING ──complete_stopping──▶ COMPLETED
//!   │                 ▲                                                        ▲
//!   └─create (while ──┘ activate_waiting                                       │
//!     finalizing) ─▶ WAITING ───────────request_stop (cancel)──────────────────┘
//! ```
//!
//! The durable store is authoritative for session state. The counter cache
//! mirrors the number of running sessions and holds one entry per open
//! session; [`SessionLifecycle::recalibrate`] repairs any drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ClosedSession, OperatorId, Session, SessionState};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::store::{keys, CounterCache, RecordStore, StoreError, StoreResult};

/// Default minimum fuel required to start a session.
pub const DEFAULT_MIN_OPERATING_FUEL: f64 = 10.0;

/// Session operation errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Operator {0} not found")]
    OperatorNotFound(OperatorId),

    #[error("Operator {0} already has an open session")]
    SessionExists(OperatorId),

    #[error("Operator {operator} has insufficient fuel: {current} < {required}")]
    InsufficientFuel {
        operator: OperatorId,
        current: f64,
        required: f64,
    },

    #[error("Operator {0} has no open session")]
    NoOpenSession(OperatorId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Clears cache state for sessions that were just closed.
///
/// Cache failures are logged, not returned; the durable close already
/// happened and `recalibrate` repairs the counter.
pub(crate) async fn release_closed_sessions(
    counters: &dyn CounterCache,
    closed: &[ClosedSession],
) {
    for session in closed {
        let entry = keys::session_entry(session.operator_id);
        if let Err(e) = counters.delete(&entry).await {
            warn!(operator = %session.operator_id, error = %e, "Failed to clear session entry");
        }
        if let Err(e) = counters.decr(keys::ACTIVE_SESSIONS).await {
            warn!(operator = %session.operator_id, error = %e, "Failed to decrement active sessions");
        }
    }
}

/// Creates, stops, activates and completes sessions.
pub struct SessionLifecycle {
    store: Arc<dyn RecordStore>,
    counters: Arc<dyn CounterCache>,
    notifier: Arc<dyn NotificationSink>,
    min_operating_fuel: f64,
    /// Set by the scheduler while a cycle boundary is processed.
    finalizing: AtomicBool,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn RecordStore>,
        counters: Arc<dyn CounterCache>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            counters,
            notifier,
            min_operating_fuel: DEFAULT_MIN_OPERATING_FUEL,
            finalizing: AtomicBool::new(false),
        }
    }

    pub fn with_min_operating_fuel(mut self, fuel: f64) -> Self {
        self.min_operating_fuel = fuel;
        self
    }

    pub fn min_operating_fuel(&self) -> f64 {
        self.min_operating_fuel
    }

    /// Marks whether a cycle boundary is being processed. New sessions are
    /// queued as WAITING while set.
    pub fn set_finalizing(&self, finalizing: bool) {
        self.finalizing.store(finalizing, Ordering::SeqCst);
    }

    pub fn is_finalizing(&self) -> bool {
        self.finalizing.load(Ordering::SeqCst)
    }

    async fn put_entry(&self, operator: OperatorId, state: SessionState) {
        let entry = keys::session_entry(operator);
        if let Err(e) = self.counters.put_entry(&entry, state.as_str().to_string()).await {
            warn!(operator = %operator, error = %e, "Failed to write session entry");
        }
    }

    async fn increment_active(&self, operator: OperatorId) {
        if let Err(e) = self.counters.incr(keys::ACTIVE_SESSIONS).await {
            warn!(operator = %operator, error = %e, "Failed to increment active sessions");
        }
    }

    /// Starts a session for `operator`.
    pub async fn create(
        &self,
        operator: OperatorId,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let op = self
            .store
            .get_operator(operator)
            .await?
            .ok_or(SessionError::OperatorNotFound(operator))?;

        if self.store.open_session(operator).await?.is_some() {
            return Err(SessionError::SessionExists(operator));
        }

        if op.current_fuel < self.min_operating_fuel {
            return Err(SessionError::InsufficientFuel {
                operator,
                current: op.current_fuel,
                required: self.min_operating_fuel,
            });
        }

        let state = if self.is_finalizing() {
            SessionState::Waiting
        } else {
            SessionState::Active
        };

        let session = match self.store.insert_session(operator, state, now).await {
            Ok(session) => session,
            Err(StoreError::Conflict(_)) => return Err(SessionError::SessionExists(operator)),
            Err(e) => return Err(e.into()),
        };

        self.put_entry(operator, state).await;
        if state == SessionState::Active {
            self.increment_active(operator).await;
        }

        info!(
            operator = %operator,
            session = %session.id,
            state = state.as_str(),
            "Session created"
        );
        Ok(session)
    }

    /// Requests that the operator's session stop.
    ///
    /// ACTIVE sessions move to STOPPING and complete at the end of the
    /// current cycle. WAITING sessions are cancelled immediately. Returns the
    /// resulting state.
    pub async fn request_stop(&self, operator: OperatorId) -> Result<SessionState, SessionError> {
        let session = self
            .store
            .open_session(operator)
            .await?
            .ok_or(SessionError::NoOpenSession(operator))?;

        match session.state {
            SessionState::Active => {
                if !self
                    .store
                    .transition_session(operator, SessionState::Active, SessionState::Stopping)
                    .await?
                {
                    return Err(SessionError::NoOpenSession(operator));
                }
                self.put_entry(operator, SessionState::Stopping).await;
                info!(operator = %operator, "Session stopping");
                Ok(SessionState::Stopping)
            }
            SessionState::Waiting => {
                if !self
                    .store
                    .transition_session(operator, SessionState::Waiting, SessionState::Completed)
                    .await?
                {
                    return Err(SessionError::NoOpenSession(operator));
                }
                if let Err(e) = self.counters.delete(&keys::session_entry(operator)).await {
                    warn!(operator = %operator, error = %e, "Failed to clear session entry");
                }
                info!(operator = %operator, "Waiting session cancelled");
                Ok(SessionState::Completed)
            }
            state => Ok(state),
        }
    }

    /// Activates every WAITING session at the start of `cycle_number`.
    pub async fn activate_waiting(
        &self,
        cycle_number: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<OperatorId>> {
        let activated = self.store.activate_waiting_sessions(now).await?;
        if activated.is_empty() {
            return Ok(activated);
        }

        for operator in &activated {
            self.put_entry(*operator, SessionState::Active).await;
            self.increment_active(*operator).await;
        }

        info!(cycle = cycle_number, count = activated.len(), "Waiting sessions activated");
        self.notifier.notify(Notification::new(
            NotificationKind::SessionsActivated,
            activated.clone(),
            json!({ "cycle": cycle_number }),
        ));
        Ok(activated)
    }

    /// Completes every STOPPING session at the end of `cycle_number`.
    pub async fn complete_stopping(
        &self,
        cycle_number: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ClosedSession>> {
        let closed = self.store.close_stopping_sessions(now).await?;
        if closed.is_empty() {
            return Ok(closed);
        }

        release_closed_sessions(self.counters.as_ref(), &closed).await;

        info!(cycle = cycle_number, count = closed.len(), "Stopping sessions completed");
        self.notifier.notify(Notification::new(
            NotificationKind::SessionsCompleted,
            closed.iter().map(|s| s.operator_id).collect(),
            json!({
                "cycle": cycle_number,
                "sessions": closed
                    .iter()
                    .map(|s| json!({
                        "operator_id": s.operator_id,
                        "earned_reward": s.earned_reward,
                    }))
                    .collect::<Vec<_>>(),
            }),
        ));
        Ok(closed)
    }

    /// Resets the active-session counter from the durable store.
    ///
    /// Returns the authoritative count.
    pub async fn recalibrate(&self) -> StoreResult<u64> {
        let actual = self.store.count_running_sessions().await?;
        let cached = self.counters.get(keys::ACTIVE_SESSIONS).await?;

        if cached != Some(actual) {
            warn!(
                cached = ?cached,
                actual,
                "Active session counter drifted, recalibrating"
            );
        } else {
            debug!(actual, "Active session counter in sync");
        }
        self.counters.set(keys::ACTIVE_SESSIONS, actual).await?;
        Ok(actual)
    }
}
