//! # Callback Events
//!
//! Purpose: Describe the two notifications a cache callback can observe,
//! mirroring `spec.md` §6 ("Events emitted to callback").

use crate::id::CacheId;

/// An event delivered synchronously to a cache's configured callback.
///
/// Delivery happens on the writer's execution context: `Update` fires after
/// a successful write, `Delete` fires immediately before the entry is
/// removed from the store.
#[derive(Debug, Clone)]
pub enum Event<K, V> {
    /// A key was written (or re-written) with the given stored value.
    Update(CacheId, K, V),
    /// A key is about to be removed, by user request or TTL expiry.
    Delete(CacheId, K),
}
