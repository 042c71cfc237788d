//! # Cache Registry
//!
//! Purpose: Resolve a [`CacheId`] to the running cache handle it names, the
//! way `spec.md` §6 describes resolving "opaque handle, process-local name,
//! global name, or (module, name)" references before dispatching an
//! operation.
//!
//! ## Design Principles
//!
//! 1. **Process-Local Only**: A single `RwLock`-guarded map is enough; no
//!    cross-process coherence is in scope (`spec.md` §1 Non-goals).
//! 2. **Any Handle Type**: The registry is generic over the handle type `H`
//!    so `ttlkv-core` can register `Arc<StoreFacade<..>>` without this crate
//!    depending on it.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::id::CacheId;

/// Process-wide name → handle table.
///
/// Registration is expected to happen once per cache at construction time
/// and be removed once at teardown; the lock is held only for the duration
/// of a single map operation.
pub struct Registry<H> {
    handles: RwLock<HashMap<CacheId, H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Registry {
            handles: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `id`, replacing any previous registration.
    pub fn register(&self, id: CacheId, handle: H) {
        self.handles.write().insert(id, handle);
    }

    /// Resolves `id` to its registered handle, if any.
    pub fn resolve(&self, id: &CacheId) -> Option<H> {
        self.handles.read().get(id).cloned()
    }

    /// Removes a cache's registration, returning the handle if one existed.
    pub fn remove(&self, id: &CacheId) -> Option<H> {
        self.handles.write().remove(id)
    }

    /// Number of currently registered caches.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
