//! # Error Kinds
//!
//! Purpose: Give every row-level and construction-time failure mode from the
//! cache facade a single typed home instead of scattering `String` errors.
//!
//! ## Design Principles
//!
//! 1. **One Variant Per Kind**: Each error a caller can observe has exactly
//!    one variant; no catch-all `Other(String)` bucket.
//! 2. **Generic Passthrough**: `UserError` carries whatever error type the
//!    caller's updater closure returns, so `update`/`update_existing` don't
//!    force callers into a fixed error type.
//! 3. **Fatal vs. Row-Level**: `InvalidUpdaterResult` and
//!    `InvalidStoreConfig` are unrecoverable; everything else is a normal
//!    `Result` a caller is expected to handle.

use std::convert::Infallible;
use std::fmt;

/// Result alias for row-level cache operations.
///
/// `E` defaults to [`Infallible`] for operations (`get`, `put`, `delete`, …)
/// that never invoke a user-supplied updater and therefore can't produce a
/// [`CacheError::UserError`].
pub type CacheResult<T, E = Infallible> = Result<T, CacheError<E>>;

/// Errors surfaced by [`ttlkv_core`](https://docs.rs/ttlkv-core) row
/// operations and cache construction.
#[derive(thiserror::Error)]
pub enum CacheError<E = Infallible> {
    /// `insert_new` found an existing entry for the key.
    #[error("key already exists")]
    AlreadyExists,

    /// `update_existing` found no entry for the key.
    #[error("key does not exist")]
    NotExisting,

    /// `try_isolated` (or a non-blocking acquire) found the row already held
    /// by a different holder.
    #[error("row is locked by another holder")]
    Locked,

    /// `isolated` (or a blocking acquire) waited past `acquire_lock_timeout`
    /// without obtaining the row lock.
    #[error("timed out waiting for row lock")]
    Timeout,

    /// Passthrough of the `Err(e)` returned by a user-supplied updater
    /// closure passed to `update`/`update_existing`.
    #[error("updater returned an error")]
    UserError(#[source] E),

    /// Fatal: the updater closure produced a result the facade could not
    /// interpret as a store write. Unreachable in safe Rust callers that
    /// return a proper `Result`, but kept so the kind from `spec.md` has a
    /// concrete representation.
    #[error("updater produced an invalid result")]
    InvalidUpdaterResult,

    /// Fatal: `CacheConfig` described a store that can't be constructed
    /// (bad key position, unsupported protection class, unsupported store
    /// type). Surfaced from cache construction, never from a row operation.
    #[error("invalid store configuration: {0}")]
    InvalidStoreConfig(String),
}

// Deriving `Debug`/`Clone` via `#[derive(..)]` would require `E: Debug`/`E:
// Clone` even for variants that don't hold an `E`. Implement them by hand so
// `CacheError<Infallible>` stays `Debug`/`Clone` regardless of unrelated
// bounds on other variants.
impl<E: fmt::Debug> fmt::Debug for CacheError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::AlreadyExists => f.write_str("AlreadyExists"),
            CacheError::NotExisting => f.write_str("NotExisting"),
            CacheError::Locked => f.write_str("Locked"),
            CacheError::Timeout => f.write_str("Timeout"),
            CacheError::UserError(e) => f.debug_tuple("UserError").field(e).finish(),
            CacheError::InvalidUpdaterResult => f.write_str("InvalidUpdaterResult"),
            CacheError::InvalidStoreConfig(msg) => {
                f.debug_tuple("InvalidStoreConfig").field(msg).finish()
            }
        }
    }
}

impl<E: Clone> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::AlreadyExists => CacheError::AlreadyExists,
            CacheError::NotExisting => CacheError::NotExisting,
            CacheError::Locked => CacheError::Locked,
            CacheError::Timeout => CacheError::Timeout,
            CacheError::UserError(e) => CacheError::UserError(e.clone()),
            CacheError::InvalidUpdaterResult => CacheError::InvalidUpdaterResult,
            CacheError::InvalidStoreConfig(msg) => CacheError::InvalidStoreConfig(msg.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for CacheError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheError::AlreadyExists, CacheError::AlreadyExists) => true,
            (CacheError::NotExisting, CacheError::NotExisting) => true,
            (CacheError::Locked, CacheError::Locked) => true,
            (CacheError::Timeout, CacheError::Timeout) => true,
            (CacheError::UserError(a), CacheError::UserError(b)) => a == b,
            (CacheError::InvalidUpdaterResult, CacheError::InvalidUpdaterResult) => true,
            (CacheError::InvalidStoreConfig(a), CacheError::InvalidStoreConfig(b)) => a == b,
            _ => false,
        }
    }
}
