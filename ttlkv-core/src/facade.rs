//! # Store Facade
//!
//! Provide the public surface of the cache: `get`/`put`/`delete` and friends,
//! each routed through the row lock and wired to the owner loop for TTL
//! bookkeeping, per `spec.md` §4.4.
//!
//! ## Usage
//!
//! - Build one with [`StoreFacade::new`] (bring your own [`Store`]) or
//!   [`StoreFacade::with_default_store`] (an in-process [`DashStore`]).
//! - Clone the returned facade freely across client tasks; it is a thin
//!   `Arc` handle, the same shape as wiring one `Arc<MemoryEngine>` to every
//!   connection in `hkv-server`.
//! - Call [`OwnerHandle::shutdown`] on the paired handle to stop the
//!   background sweeper when the cache is torn down.
//!
//! ## Design Principles
//!
//! 1. **Dirty by default, locked on demand**: reads and the TTL-housekeeping
//!    writes documented in `spec.md` §4.4 skip the row lock; every operation
//!    that must observe a consistent read-modify-write acquires it.
//! 2. **Implicit holder propagation**: a `tokio::task_local!` tracks the
//!    "current lock holder" for the executing task, so `isolated` calls
//!    nested inside another `isolated`'s body, even on the same key,
//!    reuse the same holder identity instead of self-deadlocking. Calling
//!    out to this task-local is the only place holder identity is ever
//!    implicit; `ttlkv-lock` itself always takes an explicit `HolderId`.
//! 3. **One owner task per cache**: `StoreFacade::new` spawns exactly one
//!    `OwnerLoop` task and hands back its `OwnerHandle` alongside the
//!    facade, never hidden inside a background thread nobody can join.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ttlkv_common::{CacheConfig, CacheError, CacheId, CacheResult, Event, Item, TtlAction, TtlSpec};
use ttlkv_lock::{HolderId, LockShard};

use crate::owner::{self, OwnerHandle, OwnerMessage};
use crate::store::{DashStore, Store};

tokio::task_local! {
    /// The lock holder identity ambient to the current task, set by the
    /// outermost `isolated` call and visible to anything nested inside its
    /// body; see "Design Principles" above.
    static CURRENT_HOLDER: HolderId;
}

fn current_holder() -> HolderId {
    CURRENT_HOLDER
        .try_with(|holder| *holder)
        .unwrap_or_else(|_| HolderId::new())
}

pub(crate) struct Inner<K, V, E, S> {
    pub(crate) id: CacheId,
    pub(crate) config: CacheConfig,
    pub(crate) store: S,
    pub(crate) locks: LockShard<K>,
    pub(crate) callback: Option<Arc<dyn Fn(Event<K, V>) + Send + Sync>>,
    pub(crate) owner_tx: mpsc::UnboundedSender<OwnerMessage<K>>,
    _marker: std::marker::PhantomData<fn() -> E>,
}

/// The public cache handle. Cheap to clone; every clone shares the same
/// underlying store, row-lock table, and owner task.
pub struct StoreFacade<K, V, E = std::convert::Infallible, S = DashStore<K, V>> {
    inner: Arc<Inner<K, V, E, S>>,
}

impl<K, V, E, S> Clone for StoreFacade<K, V, E, S> {
    fn clone(&self) -> Self {
        StoreFacade {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E, S> StoreFacade<K, V, E, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    S: Store<K, V> + 'static,
{
    /// Builds a cache instance backed by a caller-supplied [`Store`],
    /// validating `config` and spawning its owner task. Returns the facade
    /// paired with the [`OwnerHandle`] needed to shut that task down later.
    pub fn new(
        config: CacheConfig,
        store: S,
        callback: Option<Arc<dyn Fn(Event<K, V>) + Send + Sync>>,
        cache_id: impl Into<CacheId>,
    ) -> CacheResult<(Self, OwnerHandle), E> {
        config.validate::<E>()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            id: cache_id.into(),
            config: config.clone(),
            store,
            locks: LockShard::new(config.lock_shards),
            callback,
            owner_tx: tx,
            _marker: std::marker::PhantomData,
        });

        let tick_interval = config.ttl_check_ms.map(Duration::from_millis);
        let owner = owner::spawn(Arc::clone(&inner), config.horizon(), tick_interval, rx);

        Ok((StoreFacade { inner }, owner))
    }

    fn lock_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.inner.config.acquire_lock_timeout_ms))
    }

    fn send_ttl(&self, k: K, action: TtlAction) {
        let _ = self.inner.owner_tx.send(OwnerMessage::SetTtl(k, action));
    }

    /// Resolves a write's `TtlSpec` to the `TtlAction` sent to the owner
    /// loop, per `spec.md` §4.4 "TTL handling on writes". `NoUpdate` never
    /// contacts the owner loop at all.
    fn maybe_send_ttl(&self, k: K, ttl: TtlSpec) {
        let action = match ttl {
            TtlSpec::Default => TtlAction::Steps(self.inner.config.steps_for_ttl_ms(self.inner.config.ttl_ms)),
            TtlSpec::NoUpdate => return,
            TtlSpec::Renew => TtlAction::Renew,
            TtlSpec::Steps(n) => TtlAction::Steps(n),
        };
        self.send_ttl(k, action);
    }

    fn emit_update(&self, k: K, v: V) {
        if let Some(callback) = &self.inner.callback {
            callback(Event::Update(self.inner.id.clone(), k, v));
        }
    }

    /// Dirty read: never touches the row lock. Sends a `Renew` if
    /// `touch_on_read` is configured and the key was present.
    pub fn get(&self, k: &K) -> Option<V> {
        let value = self.inner.store.get(k);
        if value.is_some() && self.inner.config.touch_on_read {
            self.send_ttl(k.clone(), TtlAction::Renew);
        }
        value
    }

    /// Unconditional write. Plain values are treated as
    /// `Item { ttl: TtlSpec::Default }`.
    pub async fn put(&self, k: K, item: impl Into<Item<V>>) -> CacheResult<(), E> {
        let Item { value, ttl } = item.into();
        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        self.inner.store.put(k.clone(), value.clone());
        self.maybe_send_ttl(k.clone(), ttl);
        self.emit_update(k, value);
        Ok(())
    }

    /// Writes only if `k` is absent; `Err(AlreadyExists)` otherwise.
    pub async fn insert_new(&self, k: K, item: impl Into<Item<V>>) -> CacheResult<(), E> {
        let Item { value, ttl } = item.into();
        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        if self.inner.store.contains(&k) {
            return Err(CacheError::AlreadyExists);
        }

        self.inner.store.put(k.clone(), value.clone());
        self.maybe_send_ttl(k.clone(), ttl);
        self.emit_update(k, value);
        Ok(())
    }

    /// Read-modify-write: `f` receives the current value (or `None`) and
    /// returns the new `Item` to store, or a user error to propagate.
    pub async fn update<F>(&self, k: K, f: F) -> CacheResult<(), E>
    where
        F: FnOnce(Option<V>) -> Result<Item<V>, E>,
    {
        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        let current = self.inner.store.get(&k);
        let Item { value, ttl } = f(current).map_err(CacheError::UserError)?;

        self.inner.store.put(k.clone(), value.clone());
        self.maybe_send_ttl(k.clone(), ttl);
        self.emit_update(k, value);
        Ok(())
    }

    /// As [`Self::update`], but `Err(NotExisting)` if `k` is absent instead
    /// of calling `f` with `None`.
    pub async fn update_existing<F>(&self, k: K, f: F) -> CacheResult<(), E>
    where
        F: FnOnce(V) -> Result<Item<V>, E>,
    {
        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        let current = self.inner.store.get(&k).ok_or(CacheError::NotExisting)?;
        let Item { value, ttl } = f(current).map_err(CacheError::UserError)?;

        self.inner.store.put(k.clone(), value.clone());
        self.maybe_send_ttl(k.clone(), ttl);
        self.emit_update(k, value);
        Ok(())
    }

    /// Removes `k`, firing the `Delete` callback first if it was present.
    pub async fn delete(&self, k: &K) -> CacheResult<(), E> {
        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        if self.inner.store.contains(k) {
            if let Some(callback) = &self.inner.callback {
                callback(Event::Delete(self.inner.id.clone(), k.clone()));
            }
            self.inner.store.remove(k);
        }
        Ok(())
    }

    /// Dirty-reads first; if absent, acquires the row lock, re-checks (a
    /// concurrent writer may have raced ahead), and calls `f` to compute the
    /// value to store.
    pub async fn get_or_store<F>(&self, k: K, f: F) -> CacheResult<V, E>
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.inner.store.get(&k) {
            return Ok(value);
        }

        let holder = current_holder();
        let _guard = self
            .inner
            .locks
            .acquire::<E>(k.clone(), holder, self.lock_timeout())
            .await?;

        if let Some(value) = self.inner.store.get(&k) {
            return Ok(value);
        }

        let value = f();
        self.inner.store.put(k.clone(), value.clone());
        self.maybe_send_ttl(k.clone(), TtlSpec::Default);
        self.emit_update(k, value.clone());
        Ok(value)
    }

    /// Enqueues a `Renew` without taking the row lock.
    pub fn touch(&self, k: K) {
        self.send_ttl(k, TtlAction::Renew);
    }

    pub fn size(&self) -> usize {
        self.inner.store.len()
    }

    /// Runs `f` while holding `k`'s row lock, waiting up to `timeout` (or
    /// indefinitely if `None`). Nested `isolated`/`try_isolated` calls made
    /// from within `f`, on the same key or a different one, see the same
    /// holder identity as this call, so same-key nesting is reentrant rather
    /// than self-deadlocking.
    pub async fn isolated<T, F, Fut>(&self, k: K, timeout: Option<Duration>, f: F) -> CacheResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let holder = current_holder();
        let guard = self.inner.locks.acquire::<E>(k, holder, timeout).await?;
        let result = CURRENT_HOLDER.scope(holder, f()).await;
        drop(guard);
        Ok(result)
    }

    /// Non-blocking `isolated`: `Err(Locked)` instead of waiting if another
    /// holder currently owns `k`.
    pub fn try_isolated<T, F>(&self, k: K, f: F) -> CacheResult<T, E>
    where
        F: FnOnce() -> T,
    {
        let holder = current_holder();
        let guard = self.inner.locks.try_acquire::<E>(k, holder)?;
        let result = f();
        drop(guard);
        Ok(result)
    }
}

impl<K, V, E> StoreFacade<K, V, E, DashStore<K, V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Convenience constructor backed by the in-process [`DashStore`].
    pub fn with_default_store(
        config: CacheConfig,
        callback: Option<Arc<dyn Fn(Event<K, V>) + Send + Sync>>,
        cache_id: impl Into<CacheId>,
    ) -> CacheResult<(Self, OwnerHandle), E> {
        Self::new(config, DashStore::new(), callback, cache_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn facade() -> (StoreFacade<&'static str, i32>, OwnerHandle) {
        StoreFacade::<&str, i32>::with_default_store(CacheConfig::default(), None, "test").unwrap()
    }

    fn facade_with_str_errors() -> (StoreFacade<&'static str, i32, &'static str>, OwnerHandle) {
        StoreFacade::<&str, i32, &str>::with_default_store(CacheConfig::default(), None, "test")
            .unwrap()
    }

    #[tokio::test]
    async fn update_existing_fails_on_absent_key() {
        let (facade, owner) = facade();
        let err = facade
            .update_existing("a", |_: i32| Ok::<_, Infallible>(Item::default_ttl(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NotExisting));
        owner.shutdown().await;
    }

    #[tokio::test]
    async fn update_existing_propagates_user_error() {
        let (facade, owner) = facade_with_str_errors();
        facade.put("a", 1).await.unwrap();

        let err = facade
            .update_existing("a", |_: i32| Err("bad update"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UserError("bad update")));
        assert_eq!(facade.get(&"a"), Some(1));
        owner.shutdown().await;
    }

    #[tokio::test]
    async fn get_or_store_only_computes_once_for_concurrent_callers() {
        let (facade, owner) = facade();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let facade = facade.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                facade
                    .get_or_store("a", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        7
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        owner.shutdown().await;
    }

    #[tokio::test]
    async fn size_reflects_live_key_count() {
        let (facade, owner) = facade();
        assert_eq!(facade.size(), 0);

        facade.put("a", 1).await.unwrap();
        facade.put("b", 2).await.unwrap();
        assert_eq!(facade.size(), 2);

        facade.delete(&"a").await.unwrap();
        assert_eq!(facade.size(), 1);
        owner.shutdown().await;
    }
}
