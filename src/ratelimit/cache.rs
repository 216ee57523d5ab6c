//! Bounded in-memory cache of the last known counter per window.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::window::WindowKey;
use crate::clock::Clock;
use crate::metrics::{Metric, MetricsSink};

/// Last known state of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheEntry {
    pub current: i64,
    /// Epoch milliseconds when the window ends
    pub reset: i64,
}

/// Process-lifetime counter cache.
///
/// Writes follow the monotonic-max rule: a stored `current` is only ever
/// raised. Once the map grows past `capacity`, the next write prunes entries
/// whose window has already ended.
#[derive(Debug)]
pub struct CounterCache {
    entries: DashMap<WindowKey, CacheEntry>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl CounterCache {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            clock,
            metrics,
        }
    }

    pub fn get(&self, key: &WindowKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    /// Store `{current, reset}` unless a higher `current` is already stored.
    ///
    /// Returns the `current` held for the key after the write.
    pub fn set_max(&self, key: &WindowKey, current: i64, reset: i64) -> i64 {
        self.metrics.emit(Metric::CacheSize { size: self.entries.len() });

        if self.entries.len() > self.capacity {
            self.evict_expired();
        }

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get().current;
                if current > stored {
                    occupied.insert(CacheEntry { current, reset });
                    current
                } else {
                    trace!(key = %key, stored, current, "Ignoring non-increasing counter");
                    stored
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry { current, reset });
                current
            }
        }
    }

    /// Drop every entry whose window has ended. A window ends at `reset`.
    fn evict_expired(&self) {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset > now);
        debug!(
            before,
            after = self.entries.len(),
            capacity = self.capacity,
            "Pruned expired ratelimit windows"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::testing::RecordingMetrics;
    use crate::metrics::TracingMetrics;
    use crate::ratelimit::window::Window;

    const NOW: i64 = 1_700_000_000_000;

    fn key(identifier: &str) -> WindowKey {
        WindowKey::new(identifier, Window::at(NOW, 1_000), None)
    }

    fn cache(capacity: usize, clock: Arc<ManualClock>) -> CounterCache {
        CounterCache::new(capacity, clock, Arc::new(TracingMetrics))
    }

    #[test]
    fn test_get_missing() {
        let cache = cache(10, Arc::new(ManualClock::new(NOW)));
        assert_eq!(cache.get(&key("a")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_max_only_raises() {
        let cache = cache(10, Arc::new(ManualClock::new(NOW)));
        let k = key("a");

        assert_eq!(cache.set_max(&k, 3, NOW + 1_000), 3);
        assert_eq!(cache.set_max(&k, 5, NOW + 1_000), 5);
        assert_eq!(cache.set_max(&k, 4, NOW + 2_000), 5);

        let entry = cache.get(&k).unwrap();
        assert_eq!(entry.current, 5);
        // A losing write does not touch the reset either
        assert_eq!(entry.reset, NOW + 1_000);
    }

    #[test]
    fn test_set_max_is_order_independent() {
        let orders: [[i64; 4]; 3] = [[1, 7, 3, 5], [7, 5, 3, 1], [3, 1, 5, 7]];
        for order in orders {
            let cache = cache(10, Arc::new(ManualClock::new(NOW)));
            let k = key("a");
            for current in order {
                cache.set_max(&k, current, NOW + 1_000);
            }
            assert_eq!(cache.get(&k).unwrap().current, 7, "order {:?}", order);
        }
    }

    #[test]
    fn test_set_max_concurrent_writers() {
        let cache = Arc::new(cache(10, Arc::new(ManualClock::new(NOW))));
        let k = key("a");

        let handles: Vec<_> = (0..8i64)
            .map(|t| {
                let cache = cache.clone();
                let k = k.clone();
                std::thread::spawn(move || {
                    for i in 0..100i64 {
                        cache.set_max(&k, (i * 8 + t) % 500, NOW + 1_000);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.get(&k).unwrap().current, 499);
    }

    #[test]
    fn test_eviction_keeps_live_entries() {
        let clock = Arc::new(ManualClock::new(NOW));
        let cache = cache(5, clock.clone());

        for i in 0..3 {
            cache.set_max(&key(&format!("live-{}", i)), 1, NOW + 60_000);
        }
        for i in 0..5 {
            cache.set_max(&key(&format!("stale-{}", i)), 1, NOW + 500);
        }
        assert_eq!(cache.len(), 8);

        // The stale windows have ended; the next write prunes them
        clock.set(NOW + 1_000);
        cache.set_max(&key("fresh"), 1, NOW + 60_000);

        assert_eq!(cache.len(), 4);
        for i in 0..3 {
            assert!(cache.get(&key(&format!("live-{}", i))).is_some());
        }
        assert!(cache.get(&key("stale-0")).is_none());
    }

    #[test]
    fn test_eviction_drops_window_ending_now() {
        let clock = Arc::new(ManualClock::new(NOW));
        let cache = cache(1, clock.clone());

        cache.set_max(&key("ending"), 1, NOW + 1_000);
        cache.set_max(&key("live"), 1, NOW + 1_001);

        clock.set(NOW + 1_000);
        cache.set_max(&key("fresh"), 1, NOW + 2_000);

        assert!(cache.get(&key("ending")).is_none());
        assert!(cache.get(&key("live")).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_no_eviction_under_capacity() {
        let clock = Arc::new(ManualClock::new(NOW));
        let cache = cache(10, clock.clone());

        cache.set_max(&key("old"), 1, NOW - 1);
        cache.set_max(&key("new"), 1, NOW + 1_000);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_emits_size_on_every_write() {
        let metrics = Arc::new(RecordingMetrics::default());
        let cache = CounterCache::new(10, Arc::new(ManualClock::new(NOW)), metrics.clone());

        cache.set_max(&key("a"), 1, NOW + 1_000);
        cache.set_max(&key("b"), 1, NOW + 1_000);

        assert_eq!(
            metrics.events(),
            vec![Metric::CacheSize { size: 0 }, Metric::CacheSize { size: 1 }]
        );
    }
}
