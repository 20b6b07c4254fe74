//! Live index of extractor-eligible drills.
//!
//! # Lifecycle
//!
//! The index is ephemeral (in-memory only):
//! - Built on startup with one bulk load via [`EligibleIndex::load`]
//! - Kept in sync by [`EligibleIndexWatcher`] from the store's drill change feed
//! - Fully reconciled on a timer when no feed exists or the feed lags
//!
//! It is eventually consistent with the durable drill store, bounded by
//! change-feed latency. Selection tolerates a stale snapshot.

mod eligible;
mod watcher;

pub use eligible::{EligibleDrill, EligibleIndex};
pub use watcher::{EligibleIndexWatcher, DEFAULT_RECONCILE_INTERVAL_SECS};
