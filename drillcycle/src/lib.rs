//! Drillcycle - periodic cycle engine for a multi-operator reward economy
//!
//! At every cycle boundary the engine opens a new cycle, picks an extractor
//! drill by efficiency-weighted lottery, settles the previous cycle's
//! issuance across operators and pools, and moves every operator's fuel.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```no_run
//! use drillcycle::config::ConfigFile;
//! use drillcycle::service::{Collaborators, CycleService};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigFile::load()?;
//! let service = CycleService::new(&config, Collaborators::in_memory())?;
//!
//! // Runs until the shutdown token is cancelled
//! service.run(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The components underneath ([`scheduler`], [`selector`], [`rewards`],
//! [`fuel`], [`session`], [`index`]) can also be wired by hand against any
//! [`store::RecordStore`] and [`store::CounterCache`].

pub mod config;
pub mod efficiency;
pub mod fuel;
pub mod index;
pub mod logging;
pub mod model;
pub mod notify;
pub mod random;
pub mod rewards;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod session;
pub mod store;

/// Version of the drillcycle library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
