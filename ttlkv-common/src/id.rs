//! # Cache Handle Identity
//!
//! Purpose: Give callback events and the registry a cheap, cloneable handle
//! identity, matching `spec.md` §6 ("Cache handle resolution").

use std::fmt;
use std::sync::Arc;

/// An opaque, cloneable identifier for a running cache instance.
///
/// `spec.md` describes resolving a cache by opaque handle, process-local
/// name, global name, or `(module, name)` pair. Those all collapse to a
/// single string key here, since nothing downstream needs the distinction:
/// whichever naming scheme a caller used resolves to the same `CacheId`
/// before it reaches [`crate::registry::Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheId(Arc<str>);

impl CacheId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        CacheId(name.into())
    }

    /// Builds a handle from a `(module, name)` pair, joined the way a
    /// qualified Erlang/Elixir-style registration would be.
    pub fn qualified(module: &str, name: &str) -> Self {
        CacheId(Arc::from(format!("{module}:{name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheId {
    fn from(name: &str) -> Self {
        CacheId::new(name)
    }
}

impl From<String> for CacheId {
    fn from(name: String) -> Self {
        CacheId::new(name)
    }
}
