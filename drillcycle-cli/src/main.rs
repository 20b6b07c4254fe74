//! drillcycle CLI - Command-line interface
//!
//! This binary runs the cycle engine and manages its configuration.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use commands::status::StatusArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "drillcycle")]
#[command(version = drillcycle::VERSION)]
#[command(about = "Periodic extraction cycles with reward settlement and fuel", long_about = None)]
struct Cli {
    /// Use this config file instead of ~/.drillcycle/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a seeded in-memory world
    Run {
        /// Stop after this many cycle boundaries (default: run until Ctrl+C)
        #[arg(long)]
        cycles: Option<u64>,

        /// Cycle duration in seconds, overriding the config
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Number of demo operators
        #[arg(long, default_value = "16")]
        operators: u64,

        /// Seed for the demo world
        #[arg(long)]
        seed: Option<u64>,

        /// Force the cycle counter before starting (requires --admin-secret)
        #[arg(long)]
        reset_counter: Option<u64>,

        /// Admin secret matching [admin] secret in config.ini
        #[arg(long, env = "DRILLCYCLE_ADMIN_SECRET")]
        admin_secret: Option<String>,
    },

    /// Show the configured engine parameters and issuance schedule
    Status {
        /// First cycle number
        #[arg(long, default_value = "1")]
        from: u64,

        /// Number of cycles to print
        #[arg(long, default_value = "10")]
        count: u64,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Run {
            cycles,
            interval_secs,
            operators,
            seed,
            reset_counter,
            admin_secret,
        } => commands::run::run(RunArgs {
            config: cli.config,
            cycles,
            interval_secs,
            operators,
            seed,
            reset_counter,
            admin_secret,
        }),
        Commands::Status { from, count } => {
            commands::status::run(StatusArgs { from, count }, cli.config.as_deref())
        }
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}
