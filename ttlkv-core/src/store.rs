//! # Associative Store
//!
//! Purpose: the external collaborator `StoreFacade` mutates through the row
//! lock (`spec.md` §3, "external associative store"), expressed as a
//! concrete trait so the facade is buildable and testable without a real
//! external database.
//!
//! `DashStore` is the one in-process backend shipped here, grounded in the
//! sharded `MemoryEngine` (`hkv-engine/src/memory.rs`) but built on
//! `dashmap` instead of a hand-rolled shard table, the pack's own
//! concurrent-map idiom for this exact shape (see
//! `harborgrid-justin-caddy/src/enterprise/cache/lock.rs`).

use std::hash::Hash;

use dashmap::DashMap;

/// The associative backing store `StoreFacade` reads and writes through the
/// row lock. Swapping in a different backend (an external database, a
/// remote KV service) means implementing this trait; `ttlkv-core` does not
/// require more than one implementation.
pub trait Store<K, V>: Send + Sync {
    fn get(&self, k: &K) -> Option<V>;
    fn put(&self, k: K, v: V);
    fn remove(&self, k: &K) -> Option<V>;
    fn contains(&self, k: &K) -> bool;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `dashmap`-backed in-process `Store` implementation.
///
/// `DashMap` already internally shards its map (the same motivation as the
/// hand-rolled `Shard` table in `MemoryEngine`), so `DashStore` is
/// a thin wrapper rather than reimplementing sharding here. The wheel and
/// the row lock are this crate's hard-engineering surface, not the backing
/// map.
pub struct DashStore<K, V> {
    map: DashMap<K, V, ahash::RandomState>,
}

impl<K, V> DashStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        DashStore {
            map: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }
}

impl<K, V> Default for DashStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> for DashStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, k: &K) -> Option<V> {
        self.map.get(k).map(|entry| entry.value().clone())
    }

    fn put(&self, k: K, v: V) {
        self.map.insert(k, v);
    }

    fn remove(&self, k: &K) -> Option<V> {
        self.map.remove(k).map(|(_, v)| v)
    }

    fn contains(&self, k: &K) -> bool {
        self.map.contains_key(k)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
