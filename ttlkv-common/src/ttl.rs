//! # TTL Types
//!
//! Purpose: Represent the per-write TTL instruction a caller can attach to a
//! stored value (`spec.md` §3, "Item record"), and the corresponding action
//! the wheel is asked to apply (`spec.md` §3, "pending").

/// A value optionally paired with an explicit TTL instruction.
///
/// Plain values written via `put(k, v)` are treated as `Item { value: v,
/// ttl: TtlSpec::Default }` by the facade; see `spec.md` §4.4 "TTL
/// handling on writes".
#[derive(Debug, Clone)]
pub struct Item<V> {
    pub value: V,
    pub ttl: TtlSpec,
}

impl<V> Item<V> {
    pub fn new(value: V, ttl: TtlSpec) -> Self {
        Item { value, ttl }
    }

    /// Wraps a plain value with the facade's default TTL behavior.
    pub fn default_ttl(value: V) -> Self {
        Item {
            value,
            ttl: TtlSpec::Default,
        }
    }
}

impl<V> From<V> for Item<V> {
    fn from(value: V) -> Self {
        Item::default_ttl(value)
    }
}

/// The TTL instruction attached to a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlSpec {
    /// Apply the cache's configured default TTL.
    Default,
    /// Leave the key's current expiry untouched.
    NoUpdate,
    /// Extend the key's life by its previously recorded interval.
    Renew,
    /// Set an explicit TTL of `n` wheel steps (`0` means "never expires").
    Steps(u64),
}

/// The action queued in the wheel's pending batch for a single key, between
/// two `next_step` calls.
///
/// This is the wheel-internal counterpart of [`TtlSpec`]: `TtlSpec::Default`
/// and `TtlSpec::NoUpdate` never reach the wheel (the former is resolved to
/// a concrete `Steps(n)` by the facade using the cache's default TTL, the
/// latter never sends anything).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlAction {
    /// Set (or move) the key's absolute expiry to `current_step + n`.
    Steps(u64),
    /// Extend the key's life by its previously recorded interval.
    Renew,
}

impl TtlAction {
    /// Merges a newly-queued action into an already-pending one for the same
    /// key, per the wheel's "last numeric action wins" merge policy
    /// (`spec.md` §4.1, `set`).
    pub fn merge(existing: Option<TtlAction>, incoming: TtlAction) -> TtlAction {
        match (existing, incoming) {
            (Some(TtlAction::Steps(n)), TtlAction::Renew) => TtlAction::Steps(n),
            (Some(TtlAction::Renew), TtlAction::Renew) => TtlAction::Renew,
            (_, TtlAction::Steps(n)) => TtlAction::Steps(n),
            (None, TtlAction::Renew) => TtlAction::Renew,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_keeps_existing_steps() {
        let merged = TtlAction::merge(Some(TtlAction::Steps(7)), TtlAction::Renew);
        assert_eq!(merged, TtlAction::Steps(7));
    }

    #[test]
    fn renew_after_renew_stays_renew() {
        let merged = TtlAction::merge(Some(TtlAction::Renew), TtlAction::Renew);
        assert_eq!(merged, TtlAction::Renew);
    }

    #[test]
    fn steps_always_overwrites() {
        let merged = TtlAction::merge(Some(TtlAction::Renew), TtlAction::Steps(3));
        assert_eq!(merged, TtlAction::Steps(3));

        let merged = TtlAction::merge(Some(TtlAction::Steps(9)), TtlAction::Steps(3));
        assert_eq!(merged, TtlAction::Steps(3));
    }

    #[test]
    fn renew_with_no_prior_action_is_renew() {
        let merged = TtlAction::merge(None, TtlAction::Renew);
        assert_eq!(merged, TtlAction::Renew);
    }
}
