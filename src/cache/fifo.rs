//! In-process embedding cache with FIFO eviction.
//!
//! Eviction is strictly by insertion order: when capacity is exceeded the
//! oldest insertion is removed regardless of how recently it was read, and
//! updating an existing key does not move it. This ordering is part of the
//! cache's observable contract and is relied on for reproducibility; do not
//! replace it with recency-based eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;

struct Inner<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

/// Fixed-capacity map evicting the oldest insertion first.
pub struct FifoCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> FifoCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Returns a clone of the cached value. Reads do not affect eviction
    /// order.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().map.get(key).cloned()
    }

    /// Inserts or updates an entry. Updates keep the key's original
    /// insertion position.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();

        if inner.map.contains_key(&key) {
            inner.map.insert(key, value);
            return;
        }

        if inner.map.len() >= self.capacity
            && let Some(oldest) = inner.order.pop_front()
        {
            inner.map.remove(&oldest);
        }

        inner.order.push_back(key.clone());
        inner.map.insert(key, value);
    }

    /// Returns `true` if the key is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }
}

impl<K, V> std::fmt::Debug for FifoCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoCache")
            .field("capacity", &self.capacity)
            .finish()
    }
}
