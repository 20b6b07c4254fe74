//! Component wiring for [`super::CycleService`].
//!
//! Each function builds one component from the config file and the shared
//! collaborators, so the facade only sequences them.

use std::sync::Arc;

use crate::config::ConfigFile;
use crate::fuel::FuelEconomy;
use crate::index::{EligibleIndex, EligibleIndexWatcher};
use crate::notify::{NoOpNotifier, NotificationSink};
use crate::rewards::RewardDistributor;
use crate::scheduler::{CycleScheduler, SchedulerParts};
use crate::selector::ExtractorSelector;
use crate::session::SessionLifecycle;
use crate::store::{
    CounterCache, MemoryCounters, MemoryReserve, MemoryStore, RecordStore, ReserveSink,
};

/// External collaborators the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub counters: Arc<dyn CounterCache>,
    pub reserve: Arc<dyn ReserveSink>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Collaborators {
    /// In-memory collaborators with a discarding notifier.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            counters: Arc::new(MemoryCounters::new()),
            reserve: Arc::new(MemoryReserve::new()),
            notifier: Arc::new(NoOpNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Create the session lifecycle.
pub fn create_sessions(config: &ConfigFile, c: &Collaborators) -> Arc<SessionLifecycle> {
    Arc::new(
        SessionLifecycle::new(
            Arc::clone(&c.store),
            Arc::clone(&c.counters),
            Arc::clone(&c.notifier),
        )
        .with_min_operating_fuel(config.fuel.min_operating_fuel),
    )
}

/// Create the index watcher. Subscribes to the change feed immediately.
pub fn create_watcher(
    config: &ConfigFile,
    c: &Collaborators,
    index: &Arc<EligibleIndex>,
) -> EligibleIndexWatcher {
    EligibleIndexWatcher::new(Arc::clone(index), Arc::clone(&c.store))
        .with_reconcile_interval(config.reconcile_interval())
}

/// Create the scheduler with its selector, distributor and fuel economy.
pub fn create_scheduler(
    config: &ConfigFile,
    c: &Collaborators,
    index: &Arc<EligibleIndex>,
    sessions: &Arc<SessionLifecycle>,
) -> CycleScheduler {
    let selector = ExtractorSelector::new(config.luck_range(), config.selection.seed);
    let rewards = RewardDistributor::new(Arc::clone(&c.store), Arc::clone(&c.reserve))
        .with_solo_split(config.rewards.solo_extractor, config.rewards.solo_active_members);
    let fuel = FuelEconomy::new(
        Arc::clone(&c.store),
        Arc::clone(&c.counters),
        Arc::clone(&c.notifier),
    )
    .with_policy(config.fuel_policy())
    .with_seed(config.fuel.seed);

    CycleScheduler::new(SchedulerParts {
        store: Arc::clone(&c.store),
        counters: Arc::clone(&c.counters),
        index: Arc::clone(index),
        selector,
        rewards,
        fuel,
        sessions: Arc::clone(sessions),
        notifier: Arc::clone(&c.notifier),
    })
    .with_schedule(config.schedule())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_uses_config_schedule() {
        let mut config = ConfigFile::default();
        config.cycle.duration_secs = 12;
        config.issuance.genesis = 64;

        let c = Collaborators::in_memory();
        let index = Arc::new(EligibleIndex::new());
        let sessions = create_sessions(&config, &c);
        let scheduler = create_scheduler(&config, &c, &index, &sessions);

        assert_eq!(scheduler.schedule().genesis, 64);
        assert_eq!(scheduler.tick_interval().as_secs(), 12);
    }

    #[test]
    fn test_sessions_use_config_fuel_floor() {
        let mut config = ConfigFile::default();
        config.fuel.min_operating_fuel = 33.0;
        let sessions = create_sessions(&config, &Collaborators::in_memory());
        assert_eq!(sessions.min_operating_fuel(), 33.0);
    }

    #[test]
    fn test_watcher_subscribes_to_memory_feed() {
        let config = ConfigFile::default();
        let c = Collaborators::in_memory();
        let watcher = create_watcher(&config, &c, &Arc::new(EligibleIndex::new()));
        assert!(watcher.has_feed());
    }
}
