//! Configuration file handling for ~/.drillcycle/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;
use crate::fuel::FuelPolicy;
use crate::scheduler::Schedule;
use crate::selector::LuckRange;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

fn invalid(section: &str, key: &str, value: impl ToString, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_range(
    section: &str,
    min_key: &str,
    min: f64,
    max_key: &str,
    max: f64,
) -> Result<(), ConfigFileError> {
    if !(min.is_finite() && min >= 0.0) {
        return Err(invalid(section, min_key, min, "must be a finite number >= 0"));
    }
    if !(max.is_finite() && max >= min) {
        return Err(invalid(
            section,
            max_key,
            max,
            &format!("must be a finite number >= {}", min_key),
        ));
    }
    Ok(())
}

impl ConfigFile {
    /// Load configuration from the default path (~/.drillcycle/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path (~/.drillcycle/config.ini).
    pub fn save(&self) -> Result<(), ConfigFileError> {
        let path = config_file_path();
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
        }
        Ok(path)
    }

    /// Rejects missing or inconsistent schedule parameters.
    ///
    /// Called once at startup; the engine never runs on a config that fails
    /// here.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.cycle.duration_secs == 0 {
            return Err(invalid("cycle", "duration_secs", 0, "must be greater than 0"));
        }
        if self.cycle.finalize_timeout_secs == 0 {
            return Err(invalid(
                "cycle",
                "finalize_timeout_secs",
                0,
                "must be greater than 0",
            ));
        }
        if self.issuance.genesis == 0 {
            return Err(invalid("issuance", "genesis", 0, "must be greater than 0"));
        }
        if self.issuance.epoch_length == 0 {
            return Err(invalid("issuance", "epoch_length", 0, "must be greater than 0"));
        }

        let s = &self.selection;
        check_range("selection", "min_luck", s.min_luck, "max_luck", s.max_luck)?;

        let f = &self.fuel;
        check_range(
            "fuel",
            "depletion_min",
            f.depletion_min,
            "depletion_max",
            f.depletion_max,
        )?;
        check_range("fuel", "regen_min", f.regen_min, "regen_max", f.regen_max)?;
        if !f.depletion_threshold.is_finite() {
            return Err(invalid(
                "fuel",
                "depletion_threshold",
                f.depletion_threshold,
                "must be finite",
            ));
        }
        if !(f.min_operating_fuel.is_finite() && f.min_operating_fuel >= 0.0) {
            return Err(invalid(
                "fuel",
                "min_operating_fuel",
                f.min_operating_fuel,
                "must be a finite number >= 0",
            ));
        }

        let r = &self.rewards;
        for (key, value) in [
            ("solo_extractor", r.solo_extractor),
            ("solo_active_members", r.solo_active_members),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid("rewards", key, value, "must be between 0.0 and 1.0"));
            }
        }
        if r.solo_extractor + r.solo_active_members > 1.0 + 1e-9 {
            return Err(invalid(
                "rewards",
                "solo_active_members",
                r.solo_active_members,
                "solo_extractor + solo_active_members must not exceed 1.0",
            ));
        }

        if self.index.reconcile_interval_secs == 0 {
            return Err(invalid(
                "index",
                "reconcile_interval_secs",
                0,
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Scheduler parameters from `[cycle]` and `[issuance]`.
    pub fn schedule(&self) -> Schedule {
        Schedule {
            cycle_duration: Duration::from_secs(self.cycle.duration_secs),
            genesis: self.issuance.genesis,
            epoch_length: self.issuance.epoch_length,
            recalibrate_every: self.cycle.recalibrate_every,
            finalize_timeout: Duration::from_secs(self.cycle.finalize_timeout_secs),
        }
    }

    pub fn luck_range(&self) -> LuckRange {
        LuckRange::new(self.selection.min_luck, self.selection.max_luck)
    }

    pub fn fuel_policy(&self) -> FuelPolicy {
        FuelPolicy {
            depletion_min: self.fuel.depletion_min,
            depletion_max: self.fuel.depletion_max,
            regen_min: self.fuel.regen_min,
            regen_max: self.fuel.regen_max,
            depletion_threshold: self.fuel.depletion_threshold,
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.index.reconcile_interval_secs)
    }
}

/// Get the path to the config directory (~/.drillcycle).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drillcycle")
}

/// Get the path to the config file (~/.drillcycle/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(config.cycle.duration_secs, DEFAULT_CYCLE_DURATION_SECS);
        assert_eq!(config.issuance.genesis, DEFAULT_GENESIS_ISSUANCE);
        assert_eq!(config.rewards.solo_extractor, DEFAULT_SOLO_EXTRACTOR);
        assert_eq!(config.logging.file, DEFAULT_LOG_FILE);
        assert!(config.admin.secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.cycle.duration_secs = 45;
        config.selection.seed = Some(7);
        config.fuel.regen_max = 4.5;
        config.admin.secret = Some("s3cret".to_string());
        config.logging.directory = temp_dir.path().join("logs");
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_zero_epoch() {
        let mut config = ConfigFile::default();
        config.issuance.epoch_length = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuance.epoch_length"));
    }

    #[test]
    fn test_validate_rejects_inverted_luck() {
        let mut config = ConfigFile::default();
        config.selection.min_luck = 1.5;
        config.selection.max_luck = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("selection.max_luck"));
    }

    #[test]
    fn test_validate_rejects_oversized_split() {
        let mut config = ConfigFile::default();
        config.rewards.solo_extractor = 0.7;
        config.rewards.solo_active_members = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan_fuel() {
        let mut config = ConfigFile::default();
        config.fuel.depletion_max = f64::NAN;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fuel.depletion_max"));
    }

    #[test]
    fn test_schedule_conversion() {
        let mut config = ConfigFile::default();
        config.cycle.duration_secs = 5;
        let schedule = config.schedule();
        assert_eq!(schedule.cycle_duration, Duration::from_secs(5));
        assert_eq!(schedule.genesis, DEFAULT_GENESIS_ISSUANCE);
    }
}
