//! Default values and constants for all configuration settings.
//!
//! Component defaults live next to their components; this module collects
//! them for the config file and implements `ConfigFile::default()`.

use super::file::config_directory;
use super::settings::*;

pub use crate::fuel::{
    DEFAULT_DEPLETION_MAX, DEFAULT_DEPLETION_MIN, DEFAULT_DEPLETION_THRESHOLD, DEFAULT_REGEN_MAX,
    DEFAULT_REGEN_MIN,
};
pub use crate::index::DEFAULT_RECONCILE_INTERVAL_SECS;
pub use crate::rewards::{DEFAULT_SOLO_ACTIVE_MEMBERS, DEFAULT_SOLO_EXTRACTOR};
pub use crate::scheduler::{
    DEFAULT_CYCLE_DURATION_SECS, DEFAULT_EPOCH_LENGTH, DEFAULT_FINALIZE_TIMEOUT_SECS,
    DEFAULT_GENESIS_ISSUANCE, DEFAULT_RECALIBRATE_EVERY,
};
pub use crate::selector::{DEFAULT_MAX_LUCK, DEFAULT_MIN_LUCK};
pub use crate::session::DEFAULT_MIN_OPERATING_FUEL;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "drillcycle.log";

/// Default log directory (~/.drillcycle/logs).
pub fn default_log_directory() -> std::path::PathBuf {
    config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cycle: CycleSettings {
                duration_secs: DEFAULT_CYCLE_DURATION_SECS,
                recalibrate_every: DEFAULT_RECALIBRATE_EVERY,
                finalize_timeout_secs: DEFAULT_FINALIZE_TIMEOUT_SECS,
            },
            issuance: IssuanceSettings {
                genesis: DEFAULT_GENESIS_ISSUANCE,
                epoch_length: DEFAULT_EPOCH_LENGTH,
            },
            selection: SelectionSettings {
                min_luck: DEFAULT_MIN_LUCK,
                max_luck: DEFAULT_MAX_LUCK,
                seed: None,
            },
            fuel: FuelSettings {
                depletion_min: DEFAULT_DEPLETION_MIN,
                depletion_max: DEFAULT_DEPLETION_MAX,
                regen_min: DEFAULT_REGEN_MIN,
                regen_max: DEFAULT_REGEN_MAX,
                depletion_threshold: DEFAULT_DEPLETION_THRESHOLD,
                min_operating_fuel: DEFAULT_MIN_OPERATING_FUEL,
                seed: None,
            },
            rewards: RewardSettings {
                solo_extractor: DEFAULT_SOLO_EXTRACTOR,
                solo_active_members: DEFAULT_SOLO_ACTIVE_MEMBERS,
            },
            index: IndexSettings {
                reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            },
            admin: AdminSettings { secret: None },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
