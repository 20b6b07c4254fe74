//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use drillcycle::config::ConfigFileError;
use drillcycle::service::{AdminError, ServiceError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to create the cycle service
    ServiceCreation(ServiceError),
    /// The engine failed while running
    Engine(ServiceError),
    /// Administrative operation rejected
    Admin(AdminError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
}

impl CliError {
    /// Exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::ServiceCreation(ServiceError::Config(_)) => 2,
            CliError::Admin(AdminError::Forbidden) => 3,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::ServiceCreation(ServiceError::Config(_)) | CliError::Config(_) => {
                eprintln!();
                eprintln!("Check the configuration with: drillcycle config show");
                eprintln!("Or recreate the defaults with: drillcycle config init --force");
            }
            CliError::Admin(AdminError::Forbidden) => {
                eprintln!();
                eprintln!("Set [admin] secret in config.ini and pass it with --admin-secret");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ServiceCreation(e) => write!(f, "Failed to create cycle service: {}", e),
            CliError::Engine(e) => write!(f, "Cycle engine error: {}", e),
            CliError::Admin(e) => write!(f, "Admin operation failed: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ServiceCreation(e) | CliError::Engine(e) => Some(e),
            CliError::Admin(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<AdminError> for CliError {
    fn from(e: AdminError) -> Self {
        CliError::Admin(e)
    }
}
