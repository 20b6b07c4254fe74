//! In-memory map of selectable drills.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::model::{Drill, DrillId, OperatorId};
use crate::store::{RecordStore, StoreResult};

/// Selection-relevant data for one eligible drill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibleDrill {
    pub efficiency: f64,
    pub owner_operator_id: OperatorId,
}

impl From<&Drill> for EligibleDrill {
    fn from(drill: &Drill) -> Self {
        Self {
            efficiency: drill.efficiency_rating,
            owner_operator_id: drill.owner_operator_id,
        }
    }
}

/// Thread-safe index of drills with `extractor_eligible && active`.
///
/// Uses `DashMap` so the watcher can apply changes while the scheduler takes
/// a snapshot.
#[derive(Debug, Default)]
pub struct EligibleIndex {
    entries: DashMap<DrillId, EligibleDrill>,
    /// Number of full loads performed since creation.
    loads: AtomicU64,
}

impl EligibleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with a bulk load of every selectable drill.
    ///
    /// Entries still selectable stay in place while the load is applied, so
    /// a concurrent snapshot never sees them missing. Returns the number of
    /// drills indexed.
    pub async fn load(&self, store: &dyn RecordStore) -> StoreResult<usize> {
        let loaded: HashMap<DrillId, EligibleDrill> = store
            .selectable_drills()
            .await?
            .iter()
            .map(|drill| (drill.id, EligibleDrill::from(drill)))
            .collect();

        let before = self.entries.len();
        self.entries.retain(|id, _| loaded.contains_key(id));
        let dropped = before.saturating_sub(self.entries.len());
        for (id, entry) in &loaded {
            self.entries.insert(*id, *entry);
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(drills = loaded.len(), dropped, "Eligible drill index loaded");
        Ok(loaded.len())
    }

    /// Applies the current state of one drill.
    ///
    /// Inserts or updates the entry if the drill is selectable, otherwise
    /// removes it.
    pub fn upsert(&self, drill: &Drill) {
        if drill.is_selectable() {
            self.entries.insert(drill.id, EligibleDrill::from(drill));
        } else if self.entries.remove(&drill.id).is_some() {
            debug!(drill = %drill.id, "Drill no longer eligible");
        }
    }

    /// Removes a drill unconditionally.
    pub fn remove(&self, id: DrillId) -> Option<EligibleDrill> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Re-fetches one drill and applies its current state.
    ///
    /// A drill that no longer exists is removed.
    pub async fn refresh(&self, store: &dyn RecordStore, id: DrillId) -> StoreResult<()> {
        match store.get_drill(id).await? {
            Some(drill) => self.upsert(&drill),
            None => {
                self.remove(id);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: DrillId) -> Option<EligibleDrill> {
        self.entries.get(&id).map(|e| *e)
    }

    pub fn contains(&self, id: DrillId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Copies the current entries.
    ///
    /// Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<(DrillId, EligibleDrill)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;

    fn drill(id: u64, eff: f64, eligible: bool, active: bool) -> Drill {
        Drill {
            id: DrillId(id),
            owner_operator_id: OperatorId(id * 10),
            efficiency_rating: eff,
            extractor_eligible: eligible,
            active,
        }
    }

    #[tokio::test]
    async fn test_load_filters_selectable() {
        let store = MemoryStore::new();
        store.upsert_drill(drill(1, 10.0, true, true));
        store.upsert_drill(drill(2, 20.0, true, false));
        store.upsert_drill(drill(3, 30.0, false, true));

        let index = EligibleIndex::new();
        assert_eq!(index.load(&store).await.unwrap(), 1);
        assert!(index.contains(DrillId(1)));
        assert_eq!(index.get(DrillId(1)).unwrap().owner_operator_id, OperatorId(10));
        assert_eq!(index.load_count(), 1);
    }

    #[tokio::test]
    async fn test_load_replaces_previous_contents() {
        let store = MemoryStore::new();
        let index = EligibleIndex::new();
        index.upsert(&drill(9, 5.0, true, true));

        store.upsert_drill(drill(1, 10.0, true, true));
        index.load(&store).await.unwrap();

        assert!(!index.contains(DrillId(9)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_upsert_removes_ineligible() {
        let index = EligibleIndex::new();
        index.upsert(&drill(1, 10.0, true, true));
        assert_eq!(index.len(), 1);

        index.upsert(&drill(1, 10.0, true, false));
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_updates_efficiency() {
        let index = EligibleIndex::new();
        index.upsert(&drill(1, 10.0, true, true));
        index.upsert(&drill(1, 25.0, true, true));
        assert_eq!(index.get(DrillId(1)).unwrap().efficiency, 25.0);
    }

    #[tokio::test]
    async fn test_refresh_removes_deleted_drill() {
        let store = MemoryStore::new();
        let index = EligibleIndex::new();
        index.upsert(&drill(1, 10.0, true, true));

        index.refresh(&store, DrillId(1)).await.unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_snapshot_copies_entries() {
        let index = EligibleIndex::new();
        index.upsert(&drill(1, 10.0, true, true));
        index.upsert(&drill(2, 20.0, true, true));

        let mut snapshot = index.snapshot();
        snapshot.sort_by_key(|(id, _)| *id);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].1.efficiency, 20.0);
    }

    #[tokio::test]
    async fn test_reload_never_hides_unchanged_drills() {
        let store = MemoryStore::without_change_feed();
        for id in 1..=2_000 {
            store.upsert_drill(drill(id, 10.0, true, true));
        }
        let index = Arc::new(EligibleIndex::new());
        index.load(&store).await.unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let index = Arc::clone(&index);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut smallest = usize::MAX;
                loop {
                    smallest = smallest.min(index.snapshot().len());
                    if done.load(Ordering::Acquire) {
                        break smallest;
                    }
                }
            })
        };

        for _ in 0..30 {
            index.load(&store).await.unwrap();
        }
        done.store(true, Ordering::Release);

        assert_eq!(reader.join().unwrap(), 2_000);
        assert_eq!(index.load_count(), 31);
    }
}
