//! In-process TTL map with an injected clock.
//!
//! Entries expire only by time; there is no proactive invalidation. An expired
//! entry is dropped when it is read, and inserts sweep the whole map at most
//! once per sweep interval. Population is last-write-wins per key.
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::services::clock::Clock;

pub const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    clock: Arc<dyn Clock>,
    sweep_interval: chrono::Duration,
    /// Unix millis of the last sweep.
    last_sweep: AtomicI64,
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_sweep_interval(clock, chrono::Duration::seconds(DEFAULT_SWEEP_INTERVAL_SECS))
    }

    pub fn with_sweep_interval(clock: Arc<dyn Clock>, sweep_interval: chrono::Duration) -> Self {
        let last_sweep = AtomicI64::new(clock.now().timestamp_millis());
        Self {
            entries: DashMap::new(),
            clock,
            sweep_interval,
            last_sweep,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // Re-check under the write lock so a concurrent fresh insert survives.
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    /// Insert a value that stays valid until `expires_at`.
    pub fn insert_until(&self, key: impl Into<String>, value: V, expires_at: DateTime<Utc>) {
        let now = self.clock.now();
        self.maybe_sweep(now);
        if expires_at <= now {
            return;
        }
        self.entries.insert(key.into(), Entry { value, expires_at });
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_ms - last < self.sweep_interval.num_milliseconds() {
            return;
        }
        // One caller per interval does the sweep.
        if self
            .last_sweep
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "swept expired cache entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::Duration;

    #[test]
    fn test_entry_expires_by_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache: TtlCache<u32> = TtlCache::new(clock.clone());

        cache.insert_until("a", 1, clock.now() + Duration::seconds(30));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::seconds(29));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_already_expired_insert_is_ignored() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache: TtlCache<u32> = TtlCache::new(clock.clone());
        cache.insert_until("a", 1, clock.now());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache: TtlCache<u32> = TtlCache::new(clock.clone());
        let until = clock.now() + Duration::seconds(10);
        cache.insert_until("a", 1, until);
        cache.insert_until("a", 2, until);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_insert_reclaims_expired_entries() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache: TtlCache<u32> = TtlCache::new(clock.clone());
        for i in 0..10_000 {
            cache.insert_until(format!("k{i}"), i, clock.now() + Duration::seconds(60));
        }
        assert_eq!(cache.len(), 10_000);

        clock.advance(Duration::hours(24));
        cache.insert_until("fresh", 1, clock.now() + Duration::seconds(60));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(1));
    }

    #[test]
    fn test_sweep_waits_for_interval_and_keeps_live_entries() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache: TtlCache<u32> =
            TtlCache::with_sweep_interval(clock.clone(), Duration::seconds(30));
        cache.insert_until("short", 1, clock.now() + Duration::seconds(5));
        cache.insert_until("long", 2, clock.now() + Duration::seconds(120));

        clock.advance(Duration::seconds(10));
        cache.insert_until("other", 3, clock.now() + Duration::seconds(120));
        assert_eq!(cache.len(), 3);

        clock.advance(Duration::seconds(25));
        cache.insert_until("another", 4, clock.now() + Duration::seconds(120));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.purge_expired(), 0);
    }
}
