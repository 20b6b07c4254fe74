//! Shared scheduler status for status queries and the CLI.
//!
//! Written by the scheduler at each step; read as a cloned snapshot, so
//! readers never block a cycle boundary and never fail.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::model::{DrillId, OperatorId};

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// Creating the new cycle and activating queued sessions.
    Starting,
    /// Settling the previous cycle.
    Finalizing,
    /// Scheduling is disabled; ticks are skipped.
    Paused,
    /// The run loop has exited.
    Stopped,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting cycle"),
            Self::Finalizing => write!(f, "Finalizing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Summary of the most recently finalized cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedSummary {
    pub cycle_number: u64,
    pub extractor_drill_id: Option<DrillId>,
    pub extractor_operator_id: Option<OperatorId>,
    pub issued_amount: u64,
    pub distributed: f64,
    pub reserve: f64,
    pub active_operator_count: u64,
    pub closed_sessions: usize,
}

/// Point-in-time scheduler status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStatusSnapshot {
    pub current_cycle: Option<u64>,
    pub scheduling_enabled: bool,
    pub phase: SchedulerPhase,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_finalized: Option<FinalizedSummary>,
    pub eligible_drills: usize,
    pub active_sessions: Option<u64>,
    pub ticks: u64,
    pub failed_ticks: u64,
}

impl CycleStatusSnapshot {
    /// Formats the cycle line for display.
    pub fn cycle_line(&self) -> String {
        match self.current_cycle {
            Some(n) => format!(
                "Cycle #{} | {} | scheduling {}",
                n,
                self.phase,
                if self.scheduling_enabled { "on" } else { "off" }
            ),
            None => "No cycle started yet".to_string(),
        }
    }

    /// Formats the last settlement for display.
    pub fn finalized_line(&self) -> String {
        match &self.last_finalized {
            Some(f) => format!(
                "Finalized #{}: extractor {} | issued {} | distributed {:.4} | reserve {:.4} | {} active",
                f.cycle_number,
                f.extractor_operator_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                f.issued_amount,
                f.distributed,
                f.reserve,
                f.active_operator_count
            ),
            None => "Nothing finalized yet".to_string(),
        }
    }
}

/// Thread-safe holder of the scheduler status.
#[derive(Debug, Default)]
pub struct SharedCycleStatus {
    inner: RwLock<CycleStatusSnapshot>,
}

impl SharedCycleStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update_phase(&self, phase: SchedulerPhase) {
        self.inner.write().phase = phase;
    }

    pub fn update_enabled(&self, enabled: bool) {
        self.inner.write().scheduling_enabled = enabled;
    }

    pub fn update_current(&self, cycle_number: u64) {
        self.inner.write().current_cycle = Some(cycle_number);
    }

    /// Records a tick attempt.
    pub fn record_tick(&self, at: DateTime<Utc>, ok: bool) {
        let mut inner = self.inner.write();
        inner.last_tick_at = Some(at);
        inner.ticks += 1;
        if !ok {
            inner.failed_ticks += 1;
        }
    }

    pub fn update_finalized(&self, summary: FinalizedSummary) {
        self.inner.write().last_finalized = Some(summary);
    }

    pub fn update_gauges(&self, eligible_drills: usize, active_sessions: Option<u64>) {
        let mut inner = self.inner.write();
        inner.eligible_drills = eligible_drills;
        inner.active_sessions = active_sessions;
    }

    pub fn snapshot(&self) -> CycleStatusSnapshot {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let status = SharedCycleStatus::new();
        status.update_enabled(true);
        status.update_current(4);
        status.update_phase(SchedulerPhase::Finalizing);
        status.record_tick(Utc::now(), true);
        status.record_tick(Utc::now(), false);

        let snap = status.snapshot();
        assert_eq!(snap.current_cycle, Some(4));
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.failed_ticks, 1);
        assert_eq!(snap.cycle_line(), "Cycle #4 | Finalizing | scheduling on");
    }

    #[test]
    fn test_empty_status_lines() {
        let snap = CycleStatusSnapshot::default();
        assert_eq!(snap.cycle_line(), "No cycle started yet");
        assert_eq!(snap.finalized_line(), "Nothing finalized yet");
    }

    #[test]
    fn test_finalized_line_names_extractor() {
        let status = SharedCycleStatus::new();
        status.update_finalized(FinalizedSummary {
            cycle_number: 2,
            extractor_drill_id: Some(DrillId(5)),
            extractor_operator_id: Some(OperatorId(9)),
            issued_amount: 100,
            distributed: 90.0,
            reserve: 10.0,
            active_operator_count: 3,
            closed_sessions: 0,
        });
        let line = status.snapshot().finalized_line();
        assert!(line.starts_with("Finalized #2: extractor 9"));
    }
}
