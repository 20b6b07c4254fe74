//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete engine configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Cycle timing
    pub cycle: CycleSettings,
    /// Halving issuance schedule
    pub issuance: IssuanceSettings,
    /// Extractor selection
    pub selection: SelectionSettings,
    /// Fuel economy
    pub fuel: FuelSettings,
    /// Solo reward split
    pub rewards: RewardSettings,
    /// Eligible drill index
    pub index: IndexSettings,
    /// Administrative operations
    pub admin: AdminSettings,
    /// Logging
    pub logging: LoggingSettings,
}

/// Cycle timing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    /// Cycle length in seconds; also the scheduler tick interval.
    pub duration_secs: u64,
    /// Recalibrate the active-session counter every N cycles (0 = never).
    pub recalibrate_every: u64,
    /// Seconds after which a running finalization pass is logged as slow.
    pub finalize_timeout_secs: u64,
}

/// Issuance configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceSettings {
    /// Issuance of cycle 1.
    pub genesis: u64,
    /// Cycles per halving epoch.
    pub epoch_length: u64,
}

/// Extractor selection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSettings {
    pub min_luck: f64,
    pub max_luck: f64,
    /// Fixed seed for reproducible draws.
    pub seed: Option<u64>,
}

/// Fuel economy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelSettings {
    pub depletion_min: f64,
    pub depletion_max: f64,
    pub regen_min: f64,
    pub regen_max: f64,
    /// Running sessions at or below this level are closed.
    pub depletion_threshold: f64,
    /// Fuel required to start a session.
    pub min_operating_fuel: f64,
    pub seed: Option<u64>,
}

/// Solo reward split. Pools carry their own split.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardSettings {
    pub solo_extractor: f64,
    pub solo_active_members: f64,
}

/// Eligible drill index configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    /// Full reconciliation interval when the change feed is unavailable.
    pub reconcile_interval_secs: u64,
}

/// Administrative configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSettings {
    /// Shared secret for admin operations. `None` disables them.
    pub secret: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory holding the log file
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
