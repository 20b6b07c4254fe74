//! High-level service facade for the cycle engine.
//!
//! [`CycleService`] wires the index, selector, distributor, fuel economy,
//! session lifecycle and scheduler from a [`crate::config::ConfigFile`] and
//! exposes the operations an outer request layer needs: status queries,
//! session requests and the admin controls.

mod builder;
mod error;
mod facade;

pub use builder::{create_scheduler, create_sessions, create_watcher, Collaborators};
pub use error::{AdminError, ServiceError};
pub use facade::{CycleExtendedData, CycleService};
