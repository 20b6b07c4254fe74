//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path`.

use std::path::Path;

use clap::Subcommand;
use drillcycle::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Init { force } => {
            if init_at(&path, force)? {
                println!("Wrote default configuration to {}", path.display());
            } else {
                println!("Configuration already exists at {}", path.display());
                println!("Use --force to overwrite it.");
            }
            Ok(())
        }
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Writes the defaults to `path`. Returns `false` if the file exists and
/// `force` is not set.
pub fn init_at(path: &Path, force: bool) -> Result<bool, CliError> {
    if path.exists() && !force {
        return Ok(false);
    }
    ConfigFile::default().save_to(path)?;
    Ok(true)
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;
    let valid = config.validate();

    println!("Configuration ({})", path.display());
    println!("======================");
    println!();
    println!("[cycle]");
    println!("  duration_secs = {}", config.cycle.duration_secs);
    println!("  recalibrate_every = {}", config.cycle.recalibrate_every);
    println!("  finalize_timeout_secs = {}", config.cycle.finalize_timeout_secs);
    println!("[issuance]");
    println!("  genesis = {}", config.issuance.genesis);
    println!("  epoch_length = {}", config.issuance.epoch_length);
    println!("[selection]");
    println!("  luck = {} .. {}", config.selection.min_luck, config.selection.max_luck);
    println!("  seed = {}", display_seed(config.selection.seed));
    println!("[fuel]");
    println!(
        "  depletion = {} .. {}",
        config.fuel.depletion_min, config.fuel.depletion_max
    );
    println!("  regen = {} .. {}", config.fuel.regen_min, config.fuel.regen_max);
    println!("  depletion_threshold = {}", config.fuel.depletion_threshold);
    println!("  min_operating_fuel = {}", config.fuel.min_operating_fuel);
    println!("[rewards]");
    println!("  solo_extractor = {}", config.rewards.solo_extractor);
    println!("  solo_active_members = {}", config.rewards.solo_active_members);
    println!("[index]");
    println!(
        "  reconcile_interval_secs = {}",
        config.index.reconcile_interval_secs
    );
    println!("[admin]");
    println!(
        "  secret = {}",
        if config.admin.secret.is_some() { "(set)" } else { "(not set)" }
    );
    println!("[logging]");
    println!("  directory = {}", config.logging.directory.display());
    println!("  file = {}", config.logging.file);
    println!();

    match valid {
        Ok(()) => println!("Configuration is valid."),
        Err(e) => println!("Configuration is INVALID: {}", e),
    }
    Ok(())
}

fn display_seed(seed: Option<u64>) -> String {
    seed.map(|s| s.to_string())
        .unwrap_or_else(|| "(random)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        assert!(init_at(&path, false).unwrap());
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.cycle, ConfigFile::default().cycle);
        assert_eq!(loaded.issuance, ConfigFile::default().issuance);

        assert!(!init_at(&path, false).unwrap());
        assert!(init_at(&path, true).unwrap());
    }
}
