//! Notification intent types.

use serde::Serialize;
use serde_json::{json, Value};

use crate::model::{FuelLevel, OperatorId};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new cycle row was created.
    CycleStarted,
    /// WAITING sessions became ACTIVE at a cycle start.
    SessionsActivated,
    /// A cycle was settled.
    CycleFinalized,
    /// Active operators lost fuel; depleted sessions were closed.
    FuelDepleted,
    /// Inactive operators regained fuel.
    FuelReplenished,
    /// STOPPING sessions were completed at a cycle end.
    SessionsCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CycleStarted => "cycle_started",
            NotificationKind::SessionsActivated => "sessions_activated",
            NotificationKind::CycleFinalized => "cycle_finalized",
            NotificationKind::FuelDepleted => "fuel_depleted",
            NotificationKind::FuelReplenished => "fuel_replenished",
            NotificationKind::SessionsCompleted => "sessions_completed",
        }
    }
}

/// A broadcast intent: `{kind, operatorIds, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub operator_ids: Vec<OperatorId>,
    pub payload: Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, operator_ids: Vec<OperatorId>, payload: Value) -> Self {
        Self {
            kind,
            operator_ids,
            payload,
        }
    }

    /// Fuel change intent carrying the tick's magnitude and each operator's
    /// resulting level.
    pub fn fuel(kind: NotificationKind, delta: f64, levels: &[FuelLevel]) -> Self {
        let operator_ids = levels.iter().map(|l| l.operator_id).collect();
        let payload = json!({
            "delta": delta,
            "levels": levels
                .iter()
                .map(|l| json!({
                    "operator_id": l.operator_id,
                    "current_fuel": l.current_fuel,
                    "max_fuel": l.max_fuel,
                }))
                .collect::<Vec<_>>(),
        });
        Self::new(kind, operator_ids, payload)
    }
}
