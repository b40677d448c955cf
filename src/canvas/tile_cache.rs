//! Bounded LRU cache with a replace-on-compare policy.
//!
//! Two rules, deliberately different:
//!
//! - On key collision the caller's `should_replace(old, new)` decides which
//!   value survives (for tiles: the higher selection-map version).
//! - On capacity overflow the least recently stored entry goes, regardless
//!   of how fresh it is.

use std::collections::HashMap;
use std::hash::Hash;

pub struct LruCache<K, V> {
    entries: HashMap<K, V>,
    /// LRU order: front = oldest, back = most recently stored
    lru: Vec<K>,
    capacity: usize,
    should_replace: fn(&V, &V) -> bool,
}

impl<K: Copy + Eq + Hash, V> LruCache<K, V> {
    pub fn new(capacity: usize, should_replace: fn(&V, &V) -> bool) -> Self {
        debug_assert!(capacity > 0, "LruCache capacity must be positive");
        Self { entries: HashMap::new(), lru: Vec::new(), capacity, should_replace }
    }

    /// Insert `value`; returns false if an existing entry was kept instead.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if let Some(old) = self.entries.get(&key) {
            if !(self.should_replace)(old, &value) {
                return false;
            }
            self.entries.remove(&key);
            self.lru.retain(|k| k != &key);
        }
        // Evict until there is room for one more
        while self.entries.len() >= self.capacity && !self.lru.is_empty() {
            let oldest = self.lru.remove(0);
            self.entries.remove(&oldest);
        }
        self.entries.insert(key, value);
        self.lru.push(key);
        true
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn pop(&mut self, key: &K) -> Option<V> {
        let v = self.entries.remove(key)?;
        self.lru.retain(|k| k != key);
        Some(v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from oldest to most recently stored.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.lru.iter()
    }

    /// Remove and return every entry matching `pred`.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let keys: Vec<K> = self.lru.iter().copied()
            .filter(|k| self.entries.get(k).is_some_and(|v| pred(k, v)))
            .collect();
        keys.into_iter()
            .filter_map(|k| self.pop(&k).map(|v| (k, v)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn newer(old: &(u32, &'static str), new: &(u32, &'static str)) -> bool {
        old.0 < new.0
    }

    #[test]
    fn test_collision_keeps_newer_version() {
        let mut c = LruCache::new(4, newer);
        assert!(c.insert(1, (2, "v2")));
        assert!(!c.insert(1, (0, "v0")), "older version must be rejected");
        assert_eq!(c.get(&1), Some(&(2, "v2")));
        assert!(c.insert(1, (4, "v4")));
        assert_eq!(c.get(&1), Some(&(4, "v4")));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_overflow_evicts_least_recent_regardless_of_version() {
        let mut c = LruCache::new(2, newer);
        c.insert(1, (100, "fresh"));
        c.insert(2, (0, "stale"));
        c.insert(3, (0, "stale"));
        assert!(!c.contains(&1), "recency wins over freshness under pressure");
        assert!(c.contains(&2) && c.contains(&3));
    }

    #[test]
    fn test_pop_and_drain() {
        let mut c = LruCache::new(8, newer);
        for k in 0..6 {
            c.insert(k, (0, "x"));
        }
        assert_eq!(c.pop(&3), Some((0, "x")));
        assert_eq!(c.pop(&3), None);
        let even = c.drain_where(|k, _| k % 2 == 0);
        assert_eq!(even.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(c.keys().copied().collect::<Vec<_>>(), vec![1, 5]);
    }
}
