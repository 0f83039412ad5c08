//! TTL cache for slow-changing network lookups
//!
//! Subnet CIDRs and subnet pool prefixes almost never change, and security
//! group reconciliation would otherwise fetch them once per listener.

use crate::backoff::Clock;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Bounded map whose entries expire `ttl` after insertion
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (Instant, V)>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Cached value, unless it expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(inserted, _)| now.duration_since(*inserted) < self.ttl)
            .map(|(_, value)| value.clone())
    }

    /// Store a value, evicting expired entries and then the oldest one when full
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, (inserted, _)| now.duration_since(*inserted) < self.ttl);
        }
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (inserted, _))| *inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, (now, value));
    }

    /// Cached value, or the result of `load` which is then cached.
    /// Errors are returned as-is and not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    fn cache(ttl_secs: u64, max: usize, clock: &ManualClock) -> TtlCache<String, u32> {
        TtlCache::new(Duration::from_secs(ttl_secs), max, Arc::new(clock.clone()))
    }

    #[test]
    fn test_entries_expire() {
        let clock = ManualClock::new();
        let cache = cache(60, 10, &clock);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_oldest_evicted_when_full() {
        let clock = ManualClock::new();
        let cache = cache(600, 2, &clock);
        cache.insert("a".to_string(), 1);
        clock.advance(Duration::from_secs(1));
        cache.insert("b".to_string(), 2);
        clock.advance(Duration::from_secs(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[tokio::test]
    async fn test_loader_runs_once() {
        let clock = ManualClock::new();
        let cache = cache(600, 10, &clock);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("k".to_string(), || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let clock = ManualClock::new();
        let cache = cache(600, 10, &clock);

        let err = cache
            .get_or_try_insert_with("k".to_string(), || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(err, Err("boom"));
        assert!(cache.is_empty());
    }
}
