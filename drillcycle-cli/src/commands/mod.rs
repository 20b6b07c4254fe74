//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (init, show, path)
//! - [`run`] - Run the cycle engine against a seeded in-memory world
//! - [`status`] - Configured engine parameters and the issuance schedule

pub mod config;
pub mod run;
pub mod status;
