//! # Owner Loop
//!
//! Purpose: drive the `ExpiryWheel` at a fixed cadence and dispatch
//! evictions, per `spec.md` §4.3. Modeled as a dedicated `tokio` task that
//! exclusively owns the wheel; "all wheel operations run sequentially on
//! the OwnerLoop's single execution context; no external concurrency
//! touches the wheel" is enforced structurally: nothing outside this module
//! ever holds a `&mut ExpiryWheel`.
//!
//! Grounded in the `ExpirationHandle`/`start_expirer` background
//! task (`hkv-engine/src/memory.rs`): an `Arc<AtomicBool>` shutdown flag
//! paired with a join handle, the same shape rendered over `tokio::task`
//! instead of `std::thread`.

use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ttlkv_common::{Event, TtlAction};
use ttlkv_lock::HolderId;
use ttlkv_wheel::ExpiryWheel;

use crate::facade::Inner;
use crate::store::Store;

/// Message sent from `StoreFacade` to the owner task.
pub(crate) enum OwnerMessage<K> {
    SetTtl(K, TtlAction),
}

/// Handle to a running owner task: lets the facade shut it down cleanly.
///
/// Not `Clone`: exactly one `OwnerHandle` is returned per cache instance
/// from `StoreFacade::new`, matching `ExpirationHandle`
/// ("the returned handle must be stopped to avoid leaking the thread").
pub struct OwnerHandle {
    shutdown: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

impl OwnerHandle {
    /// Signals the owner task to stop and waits for it to finish its
    /// current tick. The wheel and any remaining keys are dropped with it;
    /// this is the only teardown path, per `spec.md` §5's note that "OwnerLoop has
    /// no cancellation channel other than cache shutdown".
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.join.await;
    }
}

/// Spawns the owner task for a freshly constructed cache instance.
///
/// `tick_interval: None` means expiry is disabled entirely (`ttl_check_ms`
/// unset): no timer is armed, and the task only drains `set_ttl` messages
/// (which become no-ops since nothing ever calls `wheel.next_step()`) until
/// shutdown.
pub(crate) fn spawn<K, V, E, S>(
    inner: Arc<Inner<K, V, E, S>>,
    max_step: u64,
    tick_interval: Option<Duration>,
    mut rx: mpsc::UnboundedReceiver<OwnerMessage<K>>,
) -> OwnerHandle
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    S: Store<K, V> + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_task = Arc::clone(&shutdown);

    let join = tokio::spawn(async move {
        let mut wheel: ExpiryWheel<K> = ExpiryWheel::new(max_step);

        match tick_interval {
            None => {
                // Expiry disabled: just keep draining `set_ttl` messages
                // (recorded into the wheel for consistency, never swept)
                // until shutdown or the facade is dropped.
                while !shutdown_task.load(Ordering::Acquire) {
                    match rx.recv().await {
                        Some(OwnerMessage::SetTtl(k, action)) => wheel.set(k, action),
                        None => break,
                    }
                }
            }
            Some(interval) => {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    if shutdown_task.load(Ordering::Acquire) {
                        break;
                    }
                    tokio::select! {
                        _ = ticker.tick() => {
                            let expired = wheel.next_step();
                            for key in expired {
                                dispatch_expiry(&inner, key).await;
                            }
                        }
                        msg = rx.recv() => {
                            match msg {
                                Some(OwnerMessage::SetTtl(k, action)) => wheel.set(k, action),
                                None => break,
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(cache_id = %inner.id, "owner loop stopped");
    });

    OwnerHandle {
        shutdown,
        join,
    }
}

/// Routes one expired key back through the same delete path a user-issued
/// `delete` would take: acquire the row lock, fire the `Delete` callback,
/// remove the entry. Per `spec.md` §7, a panicking callback is isolated to
/// this one key via `catch_unwind` and must not halt the sweep of the rest
/// of the expired set.
async fn dispatch_expiry<K, V, E, S>(inner: &Arc<Inner<K, V, E, S>>, key: K)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Store<K, V> + 'static,
{
    let holder = HolderId::new();
    // The sweeper blocks indefinitely rather than racing a client's
    // configured timeout: `spec.md` §9 accepts that a long-held user
    // `isolated` can delay the sweeper for that one key.
    let guard = match inner.locks.acquire::<E>(key.clone(), holder, None).await {
        Ok(guard) => guard,
        Err(_) => return,
    };

    if inner.store.contains(&key) {
        if let Some(callback) = &inner.callback {
            let callback = Arc::clone(callback);
            let event = Event::Delete(inner.id.clone(), key.clone());
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!("expiry callback panicked; isolating failure to this key");
            }
        }
        inner.store.remove(&key);
    }

    drop(guard);
}
