//! Background task keeping the [`EligibleIndex`] in sync with the store.
//!
//! Follows the drill change feed when the store offers one. Lagged
//! subscriptions trigger an immediate full reload; a missing or closed feed
//! degrades to a periodic full reconciliation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EligibleIndex;
use crate::store::{DrillChange, DrillChangeKind, RecordStore};

/// Default interval between full reconciliations (5 minutes).
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Change-feed follower for the eligible drill index.
pub struct EligibleIndexWatcher {
    index: Arc<EligibleIndex>,
    store: Arc<dyn RecordStore>,
    /// Subscribed at construction so events raised between the initial load
    /// and `run` are not lost.
    feed: Option<broadcast::Receiver<DrillChange>>,
    reconcile_interval: Duration,
}

impl EligibleIndexWatcher {
    pub fn new(index: Arc<EligibleIndex>, store: Arc<dyn RecordStore>) -> Self {
        let feed = store.subscribe_drills();
        Self {
            index,
            store,
            feed,
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
        }
    }

    /// Sets the fallback reconciliation interval.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Whether the store offered a change feed.
    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    /// Applies one change-feed event.
    ///
    /// Inserts and updates re-fetch the drill; deletes remove unconditionally.
    pub async fn apply(&self, change: DrillChange) {
        match change.kind {
            DrillChangeKind::Delete => {
                self.index.remove(change.drill_id);
            }
            DrillChangeKind::Insert | DrillChangeKind::Update | DrillChangeKind::Replace => {
                if let Err(e) = self.index.refresh(self.store.as_ref(), change.drill_id).await {
                    // The next reconciliation repairs the entry.
                    warn!(drill = %change.drill_id, error = %e, "Failed to refresh drill");
                }
            }
        }
    }

    async fn reload(&self) {
        if let Err(e) = self.index.load(self.store.as_ref()).await {
            warn!(error = %e, "Eligible index reconciliation failed");
        }
    }

    /// Runs until shutdown is signalled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            feed = self.has_feed(),
            reconcile_interval_secs = self.reconcile_interval.as_secs(),
            "Eligible index watcher starting"
        );

        if let Some(feed) = self.feed.take() {
            if !self.follow(feed, &shutdown).await {
                return;
            }
            warn!("Drill change feed closed, falling back to periodic reconciliation");
        }

        self.poll(&shutdown).await;
    }

    /// Follows the change feed. Returns `true` if the feed closed and the
    /// caller should fall back to polling, `false` on shutdown.
    async fn follow(
        &self,
        mut feed: broadcast::Receiver<DrillChange>,
        shutdown: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Eligible index watcher shutting down");
                    return false;
                }

                event = feed.recv() => match event {
                    Ok(change) => {
                        debug!(drill = %change.drill_id, kind = ?change.kind, "Drill change");
                        self.apply(change).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Drill change feed lagged, reloading index");
                        self.reload().await;
                    }
                    Err(RecvError::Closed) => return true,
                }
            }
        }
    }

    async fn poll(&self, shutdown: &CancellationToken) {
        let mut interval = tokio::time::interval(self.reconcile_interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Eligible index watcher shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.reload().await;
                    debug!(drills = self.index.len(), "Eligible index reconciled");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Drill, DrillId, OperatorId};
    use crate::store::MemoryStore;

    fn drill(id: u64, eff: f64, eligible: bool) -> Drill {
        Drill {
            id: DrillId(id),
            owner_operator_id: OperatorId(id),
            efficiency_rating: eff,
            extractor_eligible: eligible,
            active: true,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change feed
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_feed_inserts_updates_and_deletes() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(EligibleIndex::new());
        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store.clone());
        assert!(watcher.has_feed());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        store.upsert_drill(drill(1, 10.0, true));
        assert!(wait_until(|| index.contains(DrillId(1))).await);

        store.upsert_drill(drill(1, 10.0, false));
        assert!(wait_until(|| !index.contains(DrillId(1))).await);

        store.upsert_drill(drill(2, 20.0, true));
        assert!(wait_until(|| index.contains(DrillId(2))).await);
        store.remove_drill(DrillId(2));
        assert!(wait_until(|| index.is_empty()).await);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_delete_removes_without_fetch() {
        let store = Arc::new(MemoryStore::new());
        store.fail_operation("get_drill", crate::store::StoreError::Unavailable("down".into()));
        let index = Arc::new(EligibleIndex::new());
        index.upsert(&drill(1, 10.0, true));

        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store);
        watcher
            .apply(DrillChange {
                kind: DrillChangeKind::Delete,
                drill_id: DrillId(1),
            })
            .await;
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_existing_entry() {
        let store = Arc::new(MemoryStore::new());
        store.fail_operation("get_drill", crate::store::StoreError::Timeout("slow".into()));
        let index = Arc::new(EligibleIndex::new());
        index.upsert(&drill(1, 10.0, true));

        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store);
        watcher
            .apply(DrillChange {
                kind: DrillChangeKind::Update,
                drill_id: DrillId(1),
            })
            .await;
        assert!(index.contains(DrillId(1)));
    }

    #[tokio::test]
    async fn test_lagged_feed_reloads_index() {
        let store = Arc::new(MemoryStore::with_feed_capacity(4));
        let index = Arc::new(EligibleIndex::new());
        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store.clone());

        // Overflow the feed before the watcher reads anything.
        for id in 1..=20 {
            store.upsert_drill(drill(id, id as f64, true));
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        assert!(wait_until(|| index.len() == 20).await);
        assert!(index.load_count() >= 1);
        let expected = store.selectable_drills().await.unwrap();
        assert!(expected.iter().all(|d| index.contains(d.id)));

        shutdown.cancel();
        handle.await.unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation fallback
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_polls_without_feed() {
        let store = Arc::new(MemoryStore::without_change_feed());
        let index = Arc::new(EligibleIndex::new());
        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store.clone())
            .with_reconcile_interval(Duration::from_secs(60));
        assert!(!watcher.has_feed());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        store.upsert_drill(drill(1, 10.0, true));
        assert!(index.is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(wait_until(|| index.contains(DrillId(1))).await);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_feed_falls_back_to_polling() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(EligibleIndex::new());
        let watcher = EligibleIndexWatcher::new(Arc::clone(&index), store.clone())
            .with_reconcile_interval(Duration::from_secs(60));
        assert!(watcher.has_feed());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        store.close_change_feed();
        store.upsert_drill(drill(1, 10.0, true));
        tokio::task::yield_now().await;
        assert!(!index.contains(DrillId(1)));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(wait_until(|| index.contains(DrillId(1))).await);
        assert!(index.load_count() >= 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_watcher() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(EligibleIndex::new());
        let watcher = EligibleIndexWatcher::new(index, store);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), watcher.run(shutdown))
            .await
            .unwrap();
    }
}
