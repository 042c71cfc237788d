//! # ttlkv-core
//!
//! The public cache facade and its owner task: wires `ttlkv-wheel` and
//! `ttlkv-lock` together behind the `get`/`put`/`isolated`-style API
//! `spec.md` §4.4 describes, backed by an in-process associative store.

mod facade;
mod owner;
mod store;

pub use facade::StoreFacade;
pub use owner::OwnerHandle;
pub use store::{DashStore, Store};

pub use ttlkv_common::{CacheConfig, CacheError, CacheId, CacheResult, Event, Item, TtlSpec};
pub use ttlkv_lock::HolderId;
