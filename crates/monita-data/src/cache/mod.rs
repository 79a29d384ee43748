//! Bounded metadata caching
//!
//! Resource lookups are cached for the lifetime of the process; the cache is
//! bounded and evicts the least recently used entry once full.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

/// Thread-safe LRU cache
///
/// Cloning the cache yields another handle to the same entries.
pub struct LruCache<K, V> {
    inner: Arc<Mutex<CacheState<K, V>>>,
}

struct CacheState<K, V> {
    entries: AHashMap<K, V>,
    /// Least recently used at the front
    access_order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState {
                entries: AHashMap::new(),
                access_order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    /// Get an entry, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.inner.lock();
        let value = state.entries.get(key).cloned()?;
        state.touch(key);
        Some(value)
    }

    /// Insert an entry, evicting the least recently used one when full
    ///
    /// Re-inserting an existing key replaces its value.
    pub fn put(&self, key: K, value: V) {
        let mut state = self.inner.lock();

        if state.entries.contains_key(&key) {
            state.entries.insert(key.clone(), value);
            state.touch(&key);
            return;
        }

        while state.entries.len() >= state.capacity {
            let Some(oldest) = state.access_order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }

        state.entries.insert(key.clone(), value);
        state.access_order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.access_order.clear();
    }
}

impl<K: Eq + Hash + Clone, V> CacheState<K, V> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        // Touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.get(&"a"), Some(1));
        cache.put("c", 3);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_replaces_value() {
        let cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("a", 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), Some(10));
    }

    #[test]
    fn test_concurrent_inserts() {
        let cache: LruCache<usize, usize> = LruCache::new(8);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.put(i % 16, t);
                        let _ = cache.get(&(i % 16));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 8);
    }

    #[test]
    fn test_clear() {
        let cache = LruCache::new(4);
        cache.put(1, "x");
        cache.clear();
        assert!(cache.is_empty());
    }
}
