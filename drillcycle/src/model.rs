//! Core record types shared by every component.
//!
//! These are plain data types. Persistence lives behind the collaborator
//! traits in [`crate::store`]; nothing here performs I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of an operator (participant).
    OperatorId
);
id_type!(
    /// Identifier of a drill (device).
    DrillId
);
id_type!(
    /// Identifier of a pool.
    PoolId
);
id_type!(
    /// Identifier of a session record.
    SessionId
);

/// A fixed-duration epoch; the unit of issuance and settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Monotonic cycle number, starting at 1.
    pub cycle_number: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub extractor_drill_id: Option<DrillId>,
    pub extractor_operator_id: Option<OperatorId>,
    pub active_operator_count: u64,
    /// Issuance for this cycle from the halving schedule.
    pub issued_amount: u64,
    /// Total selection weight observed when the extractor was drawn.
    pub total_weighted_efficiency: f64,
    /// Last checkpoint reached by the finalization pass.
    #[serde(default)]
    pub stage: FinalizeStage,
    /// Set once the cycle has been settled. Finalized cycles are immutable.
    pub finalized: bool,
}

impl Cycle {
    /// Creates an unfinalized cycle row.
    pub fn open(
        cycle_number: u64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        issued_amount: u64,
    ) -> Self {
        Self {
            cycle_number,
            start_time,
            end_time,
            extractor_drill_id: None,
            extractor_operator_id: None,
            active_operator_count: 0,
            issued_amount,
            total_weighted_efficiency: 0.0,
            stage: FinalizeStage::Pending,
            finalized: false,
        }
    }
}

/// Checkpoints of a finalization pass.
///
/// A pass that fails after a checkpoint resumes from it, so rewards and fuel
/// are applied at most once per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStage {
    #[default]
    Pending,
    /// Reward shares, reserve deposit and credits are persisted.
    Settled,
    /// The fuel tick for the boundary has run.
    Fueled,
}

/// Values written back onto a cycle row when it is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub extractor_drill_id: Option<DrillId>,
    pub extractor_operator_id: Option<OperatorId>,
    pub active_operator_count: u64,
    pub total_weighted_efficiency: f64,
}

/// A device owned by exactly one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub id: DrillId,
    pub owner_operator_id: OperatorId,
    /// Efficiency rating (EFF).
    pub efficiency_rating: f64,
    pub extractor_eligible: bool,
    pub active: bool,
}

impl Drill {
    /// Whether the drill takes part in extractor selection.
    pub fn is_selectable(&self) -> bool {
        self.extractor_eligible && self.active
    }
}

/// A participant accumulating efficiency and rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub display_name: String,
    pub cumulative_efficiency: f64,
    pub efficiency_multiplier: f64,
    pub efficiency_credits: f64,
    pub current_fuel: f64,
    pub max_fuel: f64,
    pub total_earned_reward: f64,
}

impl Operator {
    /// Creates an operator with full fuel and no efficiency.
    pub fn new(id: OperatorId, display_name: impl Into<String>, max_fuel: f64) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            cumulative_efficiency: 0.0,
            efficiency_multiplier: 1.0,
            efficiency_credits: 0.0,
            current_fuel: max_fuel,
            max_fuel,
            total_earned_reward: 0.0,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Requested mid-boundary; activates at the next cycle start.
    Waiting,
    Active,
    /// Stop requested; completed at the end of the current cycle.
    Stopping,
    Completed,
}

impl SessionState {
    /// Whether the session still blocks a new one for the same operator.
    pub fn is_open(self) -> bool {
        !matches!(self, SessionState::Completed)
    }

    /// Whether the session participates in rewards and fuel depletion.
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Waiting => "waiting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
        }
    }
}

/// One operator's mining session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub operator_id: OperatorId,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    /// `None` while the session is open.
    pub end_time: Option<DateTime<Utc>>,
    pub earned_reward: f64,
}

/// A closed session as returned by the bulk close operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedSession {
    pub session_id: SessionId,
    pub operator_id: OperatorId,
    /// Reward accumulated by the session, snapshotted before closure.
    pub earned_reward: f64,
    pub end_time: DateTime<Utc>,
}

/// Fractions of a cycle's issuance assigned to each recipient class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub extractor: f64,
    pub leader: f64,
    pub active_members: f64,
}

impl RewardSplit {
    pub fn new(extractor: f64, leader: f64, active_members: f64) -> Self {
        Self {
            extractor,
            leader,
            active_members,
        }
    }

    /// Sum of all fractions.
    pub fn total(&self) -> f64 {
        self.extractor + self.leader + self.active_members
    }

    /// Whether every fraction is within `[0, 1]` and the total does not exceed 1.
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        in_range(self.extractor)
            && in_range(self.leader)
            && in_range(self.active_members)
            && self.total() <= 1.0 + 1e-9
    }
}

/// A group of operators sharing a distinct reward split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub leader_operator_id: Option<OperatorId>,
    pub reward_split: RewardSplit,
}

/// Append-only ledger row for one operator's share of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardShare {
    pub cycle_number: u64,
    pub operator_id: OperatorId,
    pub amount: f64,
}

/// Resulting fuel level of one operator after a bulk fuel update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelLevel {
    pub operator_id: OperatorId,
    pub current_fuel: f64,
    pub max_fuel: f64,
}
