//! In-memory counter cache.
//!
//! Counters are kept in a `DashMap` so increments from concurrent tasks never
//! contend on a global lock. `clear()` simulates losing the cache, which is
//! what startup reconciliation recovers from.

use dashmap::DashMap;

use super::traits::{BoxFuture, CounterCache, StoreResult};

/// Thread-safe in-memory implementation of [`CounterCache`].
#[derive(Debug, Default)]
pub struct MemoryCounters {
    counters: DashMap<String, u64>,
    entries: DashMap<String, String>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every counter and entry.
    pub fn clear(&self) {
        self.counters.clear();
        self.entries.clear();
    }

    /// Synchronous read of a counter.
    pub fn value(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|v| *v)
    }

    /// Synchronous read of a cache entry.
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }
}

impl CounterCache for MemoryCounters {
    fn incr(&self, key: &str) -> BoxFuture<'_, StoreResult<u64>> {
        let mut slot = self.counters.entry(key.to_string()).or_insert(0);
        *slot += 1;
        let value = *slot;
        drop(slot);
        Box::pin(std::future::ready(Ok(value)))
    }

    fn decr(&self, key: &str) -> BoxFuture<'_, StoreResult<u64>> {
        let mut slot = self.counters.entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_sub(1);
        let value = *slot;
        drop(slot);
        Box::pin(std::future::ready(Ok(value)))
    }

    fn get(&self, key: &str) -> BoxFuture<'_, StoreResult<Option<u64>>> {
        Box::pin(std::future::ready(Ok(self.value(key))))
    }

    fn set(&self, key: &str, value: u64) -> BoxFuture<'_, StoreResult<()>> {
        self.counters.insert(key.to_string(), value);
        Box::pin(std::future::ready(Ok(())))
    }

    fn put_entry(&self, key: &str, value: String) -> BoxFuture<'_, StoreResult<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(std::future::ready(Ok(())))
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StoreResult<bool>> {
        let removed = self.counters.remove(key).is_some() | self.entries.remove(key).is_some();
        Box::pin(std::future::ready(Ok(removed)))
    }
}
