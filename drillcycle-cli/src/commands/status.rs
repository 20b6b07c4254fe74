//! Status command - configured engine parameters and the issuance schedule.

use std::path::Path;

use drillcycle::config::{config_file_path, ConfigFile};
use drillcycle::scheduler::{epoch_of, issuance};

use crate::error::CliError;

/// Arguments for the status command.
pub struct StatusArgs {
    pub from: u64,
    pub count: u64,
}

/// One row of the printed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRow {
    pub cycle_number: u64,
    pub epoch: u64,
    pub issued_amount: u64,
}

/// Issuance for `count` cycles starting at `from` (cycle numbers start at 1).
pub fn schedule_rows(config: &ConfigFile, from: u64, count: u64) -> Vec<ScheduleRow> {
    let genesis = config.issuance.genesis;
    let epoch_length = config.issuance.epoch_length;
    (from.max(1)..)
        .take(count as usize)
        .map(|n| ScheduleRow {
            cycle_number: n,
            epoch: epoch_of(n, epoch_length),
            issued_amount: issuance(n, genesis, epoch_length),
        })
        .collect()
}

/// Run the status command.
pub fn run(args: StatusArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;
    config.validate()?;

    println!("drillcycle v{}", drillcycle::VERSION);
    println!(
        "Config: {}{}",
        path.display(),
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!(
        "Cycles: {}s, finalize timeout {}s, counter recalibration {}",
        config.cycle.duration_secs,
        config.cycle.finalize_timeout_secs,
        match config.cycle.recalibrate_every {
            0 => "disabled".to_string(),
            n => format!("every {} cycles", n),
        }
    );
    println!(
        "Admin operations: {}",
        if config.admin.secret.is_some() { "enabled" } else { "disabled" }
    );
    println!(
        "Issuance: genesis {}, {} cycles per epoch",
        config.issuance.genesis, config.issuance.epoch_length
    );
    println!();
    println!("{:>12}  {:>6}  {:>12}", "cycle", "epoch", "issuance");

    for row in schedule_rows(&config, args.from, args.count) {
        println!(
            "{:>12}  {:>6}  {:>12}",
            row.cycle_number, row.epoch, row.issued_amount
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_follow_halving() {
        let mut config = ConfigFile::default();
        config.issuance.genesis = 8;
        config.issuance.epoch_length = 2;

        let issued: Vec<u64> = schedule_rows(&config, 1, 8)
            .iter()
            .map(|r| r.issued_amount)
            .collect();
        assert_eq!(issued, vec![8, 8, 4, 4, 2, 2, 1, 1]);
    }

    #[test]
    fn test_rows_start_at_cycle_one() {
        let rows = schedule_rows(&ConfigFile::default(), 0, 2);
        assert_eq!(rows[0].cycle_number, 1);
        assert_eq!(rows[0].epoch, 0);
        assert_eq!(rows.len(), 2);
    }
}
