//! Fixed-capacity map with least-recently-used eviction.
//!
//! Recency is a monotonically increasing tick per access; an ordered index from
//! tick to key finds the eviction victim in `O(log n)`. Insertion order is
//! irrelevant, only access order counts.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    tick: u64,
}

/// Bounded cache evicting the least recently accessed entry.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty cache. Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "lru capacity must be > 0");
        Self { capacity, map: HashMap::new(), order: BTreeMap::new(), next_tick: 0 }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no entries are live.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Membership check that does not count as an access.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Look up without refreshing recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|slot| &slot.value)
    }

    /// Look up and mark the entry most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.touch(key).map(|slot| &slot.value)
    }

    /// Return the entry for `key`, creating it with `make` if absent.
    ///
    /// Lookup and insertion happen in one call, so a caller holding the cache
    /// exclusively can never create two values for the same key. The second
    /// element is the entry evicted to make room, if any.
    pub fn get_or_insert_with<Q, F>(&mut self, key: &Q, make: F) -> (&V, Option<(K, V)>)
    where
        K: Borrow<Q>,
        Q: ToOwned<Owned = K> + Hash + Eq + ?Sized,
        F: FnOnce() -> V,
    {
        if self.touch(key).is_some() {
            return (&self.map[key].value, None);
        }
        let evicted = self.insert(key.to_owned(), make());
        (&self.map[key].value, evicted)
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Returns the entry evicted to make room. Replacing an existing key never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.bump();
        if let Some(slot) = self.map.get_mut(&key) {
            self.order.remove(&slot.tick);
            slot.value = value;
            slot.tick = tick;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity { self.pop_lru() } else { None };
        self.order.insert(tick, key.clone());
        self.map.insert(key, Slot { value, tick });
        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.order.values().cloned().collect()
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn touch<Q>(&mut self, key: &Q) -> Option<&Slot<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.map.contains_key(key) {
            return None;
        }
        let tick = self.bump();
        let slot = self.map.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.tick, tick);
        if let Some(owned) = self.order.remove(&previous) {
            self.order.insert(tick, owned);
        }
        Some(slot)
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.map.remove(&key)?;
        Some((key, slot.value))
    }
}
