//! # Row Lock Shard
//!
//! Provide row-level mutual exclusion keyed by an arbitrary `K`, with
//! fairness (FIFO wakeup), reentrancy per holder identity, and a
//! non-blocking try-acquire, the isolation primitive `ttlkv-core`'s
//! `StoreFacade` layers over the shared associative store.
//!
//! ## Usage
//!
//! - Call `LockShard::new(shard_count)` once per cache; clone it freely
//!   afterwards (it's an `Arc` handle internally).
//! - Call `acquire`/`try_acquire` with a [`HolderId`] identifying the
//!   logical caller; reuse the same `HolderId` for nested calls on the same
//!   key to get reentrant acquisition instead of a self-deadlock.
//! - Drop the returned [`Guard`] (or let it go out of scope) to release.
//!
//! ## Design Principles
//!
//! 1. **Lazy Records**: A [`LockRecord`] exists only while held or awaited;
//!    `release` removes it once depth hits zero and no waiters remain, so
//!    memory tracks the contended working set, not the whole keyspace.
//! 2. **Direct Hand-Off, Not Polling**: `release` transfers ownership to the
//!    next waiter by setting `owner`/`depth` itself and waking exactly that
//!    waiter, so a newly arriving `acquire` call can never barge ahead of an
//!    already-queued one, which is what gives FIFO ordering its teeth.
//! 3. **Sharding**: Records are split across `N` shards keyed by
//!    `hash(k) mod N` (a power of two), each behind its own `parking_lot`
//!    mutex, so unrelated keys never contend on the same lock.

use std::collections::VecDeque;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use ttlkv_common::error::{CacheError, CacheResult};

/// Opaque identity of a logical lock holder.
///
/// Reuse the same `HolderId` across nested `acquire`/`isolated` calls on
/// the same key from the same logical caller to get reentrant acquisition;
/// a fresh `HolderId` always contends like an unrelated caller would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderId(u64);

impl HolderId {
    /// Allocates a fresh, process-unique holder identity.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HolderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HolderId {
    fn default() -> Self {
        Self::new()
    }
}

struct Waiter {
    ticket: u64,
    holder: HolderId,
    tx: oneshot::Sender<()>,
}

struct LockRecord {
    owner: HolderId,
    depth: u32,
    waiters: VecDeque<Waiter>,
}

type ShardMap<K> = HashMap<K, LockRecord, RandomState>;

struct Inner<K> {
    shards: Vec<Mutex<ShardMap<K>>>,
    shard_mask: usize,
    hash_state: RandomState,
    next_ticket: AtomicU64,
}

/// A sharded, reentrant, async row-lock table keyed by `K`.
///
/// Cheap to clone: internally a single `Arc`, matching the handle-style
/// types the rest of the cache core passes around (e.g. a `StoreFacade`
/// holds one directly, no extra `Arc` wrapping needed by callers).
pub struct LockShard<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for LockShard<K> {
    fn clone(&self) -> Self {
        LockShard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> LockShard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates a row-lock table with `shard_count` shards (rounded up to
    /// the next power of two for fast masking). `spec.md` §4.2 default is
    /// 256.
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1).next_power_of_two();
        let hash_state = RandomState::new();
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(Mutex::new(HashMap::with_hasher(hash_state.clone())));
        }

        LockShard {
            inner: Arc::new(Inner {
                shards,
                shard_mask: shard_count - 1,
                hash_state,
                next_ticket: AtomicU64::new(0),
            }),
        }
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = self.inner.hash_state.build_hasher();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.inner.shard_mask
    }

    fn shard_for(&self, key: &K) -> &Mutex<ShardMap<K>> {
        &self.inner.shards[self.shard_index(key)]
    }

    /// Acquires the row lock for `key`, waiting up to `timeout` (or
    /// indefinitely if `None`) if another holder currently owns it.
    ///
    /// Reentrant: if `holder` already owns `key`, returns immediately with
    /// `depth` incremented instead of deadlocking against itself.
    pub async fn acquire<E>(
        &self,
        key: K,
        holder: HolderId,
        timeout: Option<Duration>,
    ) -> CacheResult<Guard<K>, E> {
        let wait = {
            let mut shard = self.shard_for(&key).lock();
            match shard.get_mut(&key) {
                None => {
                    shard.insert(
                        key.clone(),
                        LockRecord {
                            owner: holder,
                            depth: 1,
                            waiters: VecDeque::new(),
                        },
                    );
                    None
                }
                Some(rec) if rec.owner == holder => {
                    rec.depth += 1;
                    None
                }
                Some(rec) => {
                    let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = oneshot::channel();
                    rec.waiters.push_back(Waiter { ticket, holder, tx });
                    Some((ticket, rx))
                }
            }
        };

        match wait {
            None => Ok(Guard::new(self.clone(), key, holder)),
            Some((ticket, rx)) => self.wait_for_grant(key, holder, ticket, rx, timeout).await,
        }
    }

    async fn wait_for_grant<E>(
        &self,
        key: K,
        holder: HolderId,
        ticket: u64,
        rx: oneshot::Receiver<()>,
        timeout: Option<Duration>,
    ) -> CacheResult<Guard<K>, E> {
        let outcome = match timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(inner) => inner,
                Err(_elapsed) => {
                    tracing::trace!(?ticket, "row lock wait timed out");
                    self.cancel_wait(&key, holder, ticket);
                    return Err(CacheError::Timeout);
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(()) => Ok(Guard::new(self.clone(), key, holder)),
            Err(_recv_error) => Err(CacheError::Timeout),
        }
    }

    /// Removes a timed-out waiter from the queue, or, if it had already
    /// been granted ownership in a race with a concurrent `release`,
    /// immediately hands that ownership on to the next waiter instead of
    /// leaking the row lock forever.
    fn cancel_wait(&self, key: &K, holder: HolderId, ticket: u64) {
        let mut shard = self.shard_for(key).lock();
        let Some(rec) = shard.get_mut(key) else {
            return;
        };

        let before = rec.waiters.len();
        rec.waiters.retain(|w| w.ticket != ticket);
        if rec.waiters.len() != before {
            // Still queued: removed cleanly, no grant ever happened.
            return;
        }

        // Not in the queue anymore: `release` must have popped our ticket
        // and handed us ownership just as we gave up waiting. Give it back.
        if rec.owner == holder {
            let remove_record = hand_off_locked(rec);
            if remove_record {
                shard.remove(key);
            }
        }
    }

    /// Non-blocking acquire: returns `CacheError::Locked` immediately if
    /// `key` is held by a different holder, instead of waiting.
    pub fn try_acquire<E>(&self, key: K, holder: HolderId) -> CacheResult<Guard<K>, E> {
        let mut shard = self.shard_for(&key).lock();
        match shard.get_mut(&key) {
            None => {
                shard.insert(
                    key.clone(),
                    LockRecord {
                        owner: holder,
                        depth: 1,
                        waiters: VecDeque::new(),
                    },
                );
                Ok(Guard::new(self.clone(), key, holder))
            }
            Some(rec) if rec.owner == holder => {
                rec.depth += 1;
                Ok(Guard::new(self.clone(), key, holder))
            }
            Some(_) => Err(CacheError::Locked),
        }
    }

    /// Returns whether `key` is currently held by anyone.
    pub fn is_locked(&self, key: &K) -> bool {
        self.shard_for(key).lock().contains_key(key)
    }

    fn release(&self, key: &K, holder: HolderId) {
        let mut shard = self.shard_for(key).lock();
        let Some(rec) = shard.get_mut(key) else {
            tracing::trace!("release called for a key with no lock record");
            return;
        };

        debug_assert_eq!(rec.owner, holder, "release by a non-owning holder");
        rec.depth -= 1;
        if rec.depth != 0 {
            return;
        }

        if hand_off_locked(rec) {
            shard.remove(key);
        }
    }
}

/// Hands `rec`'s ownership to the next waiter still listening, skipping any
/// whose receiver was already dropped (e.g. they timed out racing this
/// release). Returns `true` if the record should now be removed (no
/// waiters left to hand off to).
fn hand_off_locked(rec: &mut LockRecord) -> bool {
    while let Some(waiter) = rec.waiters.pop_front() {
        rec.owner = waiter.holder;
        rec.depth = 1;
        if waiter.tx.send(()).is_ok() {
            return false;
        }
        // Receiver gone; try the next waiter instead of leaking this slot.
    }
    true
}

/// RAII handle to a held row lock. Releasing is implicit on `Drop`; holding
/// one instance per `acquire`/`try_acquire` call keeps reentrant depth
/// accounting correct even if a caller drops an inner guard before an
/// outer one.
pub struct Guard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    lock_shard: LockShard<K>,
    key: K,
    holder: HolderId,
}

impl<K> Guard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn new(lock_shard: LockShard<K>, key: K, holder: HolderId) -> Self {
        Guard {
            lock_shard,
            key,
            holder,
        }
    }

    pub fn holder(&self) -> HolderId {
        self.holder
    }
}

impl<K> Drop for Guard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.lock_shard.release(&self.key, self.holder);
    }
}
