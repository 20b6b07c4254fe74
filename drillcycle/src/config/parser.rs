//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cycle] section
    if let Some(section) = ini.section(Some("cycle")) {
        let s = Section::new("cycle", section);
        s.set(&mut config.cycle.duration_secs, "duration_secs", SECONDS)?;
        s.set(&mut config.cycle.recalibrate_every, "recalibrate_every", COUNT)?;
        s.set(&mut config.cycle.finalize_timeout_secs, "finalize_timeout_secs", SECONDS)?;
    }

    // [issuance] section
    if let Some(section) = ini.section(Some("issuance")) {
        let s = Section::new("issuance", section);
        s.set(&mut config.issuance.genesis, "genesis", COUNT)?;
        s.set(&mut config.issuance.epoch_length, "epoch_length", COUNT)?;
    }

    // [selection] section
    if let Some(section) = ini.section(Some("selection")) {
        let s = Section::new("selection", section);
        s.set(&mut config.selection.min_luck, "min_luck", NUMBER)?;
        s.set(&mut config.selection.max_luck, "max_luck", NUMBER)?;
        s.set_optional(&mut config.selection.seed, "seed", SEED)?;
    }

    // [fuel] section
    if let Some(section) = ini.section(Some("fuel")) {
        let s = Section::new("fuel", section);
        s.set(&mut config.fuel.depletion_min, "depletion_min", NUMBER)?;
        s.set(&mut config.fuel.depletion_max, "depletion_max", NUMBER)?;
        s.set(&mut config.fuel.regen_min, "regen_min", NUMBER)?;
        s.set(&mut config.fuel.regen_max, "regen_max", NUMBER)?;
        s.set(&mut config.fuel.depletion_threshold, "depletion_threshold", NUMBER)?;
        s.set(&mut config.fuel.min_operating_fuel, "min_operating_fuel", NUMBER)?;
        s.set_optional(&mut config.fuel.seed, "seed", SEED)?;
    }

    // [rewards] section
    if let Some(section) = ini.section(Some("rewards")) {
        let s = Section::new("rewards", section);
        s.set(&mut config.rewards.solo_extractor, "solo_extractor", FRACTION)?;
        s.set(&mut config.rewards.solo_active_members, "solo_active_members", FRACTION)?;
    }

    // [index] section
    if let Some(section) = ini.section(Some("index")) {
        let s = Section::new("index", section);
        s.set(
            &mut config.index.reconcile_interval_secs,
            "reconcile_interval_secs",
            SECONDS,
        )?;
    }

    // [admin] section
    if let Some(section) = ini.section(Some("admin")) {
        if let Some(v) = section.get("secret") {
            let v = v.trim();
            config.admin.secret = (!v.is_empty()).then(|| v.to_string());
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

const SECONDS: &str = "must be a positive integer (seconds)";
const COUNT: &str = "must be a non-negative integer";
const NUMBER: &str = "must be a number";
const FRACTION: &str = "must be a number between 0.0 and 1.0";
const SEED: &str = "must be a non-negative integer or empty";

/// One INI section with typed accessors.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Overwrites `target` if `key` is present.
    fn set<T: FromStr>(
        &self,
        target: &mut T,
        key: &str,
        reason: &str,
    ) -> Result<(), ConfigFileError> {
        if let Some(v) = self.props.get(key) {
            *target = v.trim().parse().map_err(|_| self.invalid(key, v, reason))?;
        }
        Ok(())
    }

    /// Like [`Section::set`], but an empty value clears `target`.
    fn set_optional<T: FromStr>(
        &self,
        target: &mut Option<T>,
        key: &str,
        reason: &str,
    ) -> Result<(), ConfigFileError> {
        if let Some(v) = self.props.get(key) {
            let v = v.trim();
            *target = if v.is_empty() {
                None
            } else {
                Some(v.parse().map_err(|_| self.invalid(key, v, reason))?)
            };
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = load("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_overlays_values() {
        let config = load(
            r#"
[cycle]
duration_secs = 30
recalibrate_every = 5

[issuance]
genesis = 5000
epoch_length = 250

[selection]
min_luck = 0.8
max_luck = 1.2
seed = 42

[fuel]
depletion_min = 2.5
min_operating_fuel = 20

[rewards]
solo_extractor = 0.6
solo_active_members = 0.3

[admin]
secret = hunter2
"#,
        )
        .unwrap();

        assert_eq!(config.cycle.duration_secs, 30);
        assert_eq!(config.cycle.recalibrate_every, 5);
        assert_eq!(config.cycle.finalize_timeout_secs, DEFAULT_FINALIZE_TIMEOUT_SECS);
        assert_eq!(config.issuance.genesis, 5000);
        assert_eq!(config.issuance.epoch_length, 250);
        assert_eq!(config.selection.seed, Some(42));
        assert_eq!(config.selection.min_luck, 0.8);
        assert_eq!(config.fuel.depletion_min, 2.5);
        assert_eq!(config.fuel.depletion_max, DEFAULT_DEPLETION_MAX);
        assert_eq!(config.fuel.min_operating_fuel, 20.0);
        assert_eq!(config.rewards.solo_extractor, 0.6);
        assert_eq!(config.admin.secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_empty_seed_and_secret_clear() {
        let config = load(
            r#"
[selection]
seed =

[admin]
secret =
"#,
        )
        .unwrap();
        assert!(config.selection.seed.is_none());
        assert!(config.admin.secret.is_none());
    }

    #[test]
    fn test_invalid_duration() {
        let err = load(
            r#"
[cycle]
duration_secs = ten
"#,
        )
        .unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            } => {
                assert_eq!(section, "cycle");
                assert_eq!(key, "duration_secs");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_fraction() {
        let err = load(
            r#"
[rewards]
solo_extractor = half
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rewards.solo_extractor"));
    }

    #[test]
    fn test_negative_seed_rejected() {
        let err = load(
            r#"
[fuel]
seed = -1
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fuel.seed"));
    }

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
    }
}
