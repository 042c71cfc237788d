//! # Expiry Wheel
//!
//! Provide the discrete-time, bucketed structure that tracks which keys
//! must be evicted at which future tick, and the pending-batch semantics
//! that let a burst of `set` calls between two ticks collapse predictably.
//!
//! ## Usage
//!
//! - Use `ExpiryWheel::new(max_step)` for a wheel with a finite normalization
//!   horizon, or `ExpiryWheel::unbounded()` when the horizon never matters.
//! - Call `set` as many times as needed for a key between two ticks; only
//!   the merged effective action is applied on the next `next_step`.
//! - Call `next_step` once per sweeper tick to advance the clock and collect
//!   the keys that just expired.
//!
//! ## Design Principles
//!
//! 1. **Sequential Ownership**: Every operation takes `&mut self`; the wheel
//!    is meant to be owned by a single coordinator (`ttlkv-core`'s
//!    `OwnerLoop`), never shared behind a lock that callers contend on.
//! 2. **Deferred Mutation**: `set` never touches `buckets`/`due` directly,
//!    only records intent in `pending`. Applying sets eagerly would
//!    break the off-by-one callers rely on (a key set between tick T and
//!    tick T+1 expires exactly `n` ticks after T+1, not after T).
//! 3. **Bounded Bucket Space**: Normalization rebases every absolute tick
//!    value when `current_step` reaches `max_step`, so long-running caches
//!    never grow `buckets`' key space without bound.
//! 4. **No Failure Mode**: Renewing or stepping an unknown/expired key is
//!    silently accepted, since it's a race against expiry, not a caller error.
//!
//! ## Structure Overview
//!
//! ```text
//! ExpiryWheel<K>
//!   ├── current_step: u64
//!   ├── max_step: u64                          (u64::MAX == unbounded)
//!   ├── buckets: HashMap<u64, HashSet<K>>       tick -> keys due then
//!   ├── due:     HashMap<K, (u64, u64)>         key -> (expires_at, expires_after)
//!   └── pending: HashMap<K, TtlAction>          deferred until next tick
//! ```

use std::hash::Hash;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};

use ttlkv_common::TtlAction;

/// A discrete-time bucketed expiry wheel over keys of type `K`.
pub struct ExpiryWheel<K> {
    current_step: u64,
    max_step: u64,
    hash_state: RandomState,
    buckets: HashMap<u64, HashSet<K, RandomState>, RandomState>,
    due: HashMap<K, (u64, u64), RandomState>,
    pending: HashMap<K, TtlAction, RandomState>,
}

impl<K> ExpiryWheel<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty wheel with `current_step = 0` and the given
    /// normalization horizon.
    ///
    /// `max_step` is the tick value at which normalization triggers; pass
    /// `u64::MAX` (or use [`ExpiryWheel::unbounded`]) for a wheel whose
    /// horizon is effectively never reached.
    pub fn new(max_step: u64) -> Self {
        let hash_state = RandomState::new();
        ExpiryWheel {
            current_step: 0,
            max_step,
            buckets: HashMap::with_hasher(hash_state.clone()),
            due: HashMap::with_hasher(hash_state.clone()),
            pending: HashMap::with_hasher(hash_state.clone()),
            hash_state,
        }
    }

    /// Creates an empty wheel with no normalization horizon.
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// The wheel's current logical tick.
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Number of live keys currently tracked (with a future expiry).
    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    /// Returns the key's remaining wheel steps, if it's currently tracked.
    pub fn remaining_steps(&self, key: &K) -> Option<u64> {
        self.due
            .get(key)
            .map(|&(expires_at, _)| expires_at.saturating_sub(self.current_step))
    }

    /// Records an intended TTL change in the pending batch, merging with any
    /// action already pending for `key` since the last `next_step`.
    ///
    /// Merge policy (`spec.md` §4.1):
    /// - `Renew` + existing `Steps(n)` keeps `Steps(n)`.
    /// - `Renew` + existing `Renew` stays `Renew`.
    /// - `Steps(n)` always overwrites, regardless of what was pending.
    pub fn set(&mut self, key: K, action: TtlAction) {
        let existing = self.pending.get(&key).copied();
        self.pending.insert(key, TtlAction::merge(existing, action));
    }

    /// Advances the wheel by one logical tick, applying the pending batch
    /// and returning the set of keys whose expiry has just arrived.
    ///
    /// See `spec.md` §4.1 for the five-step algorithm this implements
    /// verbatim: advance-or-normalize, apply pending, clear pending, take
    /// the current bucket, return it.
    pub fn next_step(&mut self) -> HashSet<K, RandomState> {
        if self.current_step == self.max_step {
            self.normalize();
            self.current_step = 0;
        } else {
            self.current_step += 1;
        }

        let pending = std::mem::take(&mut self.pending);
        for (key, action) in pending {
            self.apply_action(key, action);
        }

        let expired = self.buckets.remove(&self.current_step).unwrap_or_default();
        for key in &expired {
            self.due.remove(key);
        }

        tracing::trace!(
            step = self.current_step,
            expired = expired.len(),
            live = self.due.len(),
            "wheel tick advanced"
        );

        expired
    }

    fn apply_action(&mut self, key: K, action: TtlAction) {
        match action {
            TtlAction::Steps(0) => {
                // Zero TTL is "keep forever" / a no-op on an existing entry.
            }
            TtlAction::Steps(n) => self.schedule(key, n),
            TtlAction::Renew => {
                if let Some(&(_, prior_n)) = self.due.get(&key) {
                    self.schedule(key, prior_n);
                }
                // Unknown key: the item already expired. Accepted silently,
                // per spec.md's "renew-on-unknown" design choice.
            }
        }
    }

    /// Moves `key` to expire `n` steps from `current_step`, detaching it
    /// from any bucket it currently occupies.
    fn schedule(&mut self, key: K, n: u64) {
        if let Some((old_tick, _)) = self.due.get(&key).copied() {
            if let Some(bucket) = self.buckets.get_mut(&old_tick) {
                bucket.remove(&key);
                if bucket.is_empty() {
                    self.buckets.remove(&old_tick);
                }
            }
        }

        let new_tick = self.current_step + n;
        let hash_state = self.hash_state.clone();
        self.buckets
            .entry(new_tick)
            .or_insert_with(|| HashSet::with_hasher(hash_state))
            .insert(key.clone());
        self.due.insert(key, (new_tick, n));
    }

    /// Rebases every absolute tick value so bucket indices stay bounded by
    /// `max_step` even for a long-running wheel.
    ///
    /// Called only when `current_step == max_step`, i.e. immediately before
    /// `current_step` is reset to `0`. Every live key's `expires_at` is
    /// strictly greater than `current_step` at that instant (the invariant
    /// from `spec.md` §3), so `tick.saturating_sub(rebase)` never needs to
    /// clamp anything but the exact boundary case (`expires_at ==
    /// current_step + 1`), which correctly rebases to `0`, due at the
    /// first tick of the new epoch.
    fn normalize(&mut self) {
        let rebase = self.current_step + 1;

        let mut new_buckets: HashMap<u64, HashSet<K, RandomState>, RandomState> =
            HashMap::with_hasher(self.hash_state.clone());
        for (tick, keys) in self.buckets.drain() {
            let new_tick = tick.saturating_sub(rebase);
            let hash_state = self.hash_state.clone();
            new_buckets
                .entry(new_tick)
                .or_insert_with(|| HashSet::with_hasher(hash_state))
                .extend(keys);
        }
        self.buckets = new_buckets;

        for (_, (tick, _)) in self.due.iter_mut() {
            *tick = tick.saturating_sub(rebase);
        }

        tracing::debug!(rebase, "wheel normalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired_sorted(wheel: &mut ExpiryWheel<&'static str>) -> Vec<&'static str> {
        let mut v: Vec<_> = wheel.next_step().into_iter().collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn empty_wheel_stays_empty() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        assert!(wheel.next_step().is_empty());
        assert!(wheel.is_empty());
    }

    #[test]
    fn steps_n_expires_after_exactly_n_ticks() {
        // Property 3: n calls to next_step elapse between the set and the
        // step in which the key expires (the pending flush happens inside
        // the first of those calls).
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        wheel.set("a", TtlAction::Steps(3));

        assert!(expired_sorted(&mut wheel).is_empty()); // tick 1: flush, schedule for tick 4
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 2
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 3
        assert_eq!(expired_sorted(&mut wheel), vec!["a"]); // tick 4
    }

    #[test]
    fn steps_zero_never_expires() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        wheel.set("a", TtlAction::Steps(0));
        for _ in 0..10 {
            assert!(expired_sorted(&mut wheel).is_empty());
        }
    }

    #[test]
    fn multiple_sets_collapse_to_last_numeric_action() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        wheel.set("a", TtlAction::Steps(5));
        wheel.set("a", TtlAction::Renew);
        wheel.set("a", TtlAction::Steps(2));

        assert!(expired_sorted(&mut wheel).is_empty()); // tick 1: schedule for tick 3
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 2
        assert_eq!(expired_sorted(&mut wheel), vec!["a"]); // tick 3
    }

    #[test]
    fn renew_preserves_prior_interval() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        wheel.set("a", TtlAction::Steps(2));
        assert!(expired_sorted(&mut wheel).is_empty()); // due at tick 3

        wheel.set("a", TtlAction::Renew);
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 2: renewed, now due at tick 4
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 3
        assert_eq!(expired_sorted(&mut wheel), vec!["a"]); // tick 4
    }

    #[test]
    fn renew_on_unknown_key_is_a_silent_no_op() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
        wheel.set("ghost", TtlAction::Renew);
        assert!(expired_sorted(&mut wheel).is_empty());
        assert!(wheel.is_empty());
    }

    #[test]
    fn normalization_preserves_eventual_expiry_timing() {
        // This is S6 from spec.md §8, reproduced verbatim.
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::new(3);
        wheel.set("foo", TtlAction::Steps(1));
        wheel.set("bar", TtlAction::Steps(4));

        assert!(expired_sorted(&mut wheel).is_empty()); // tick 1
        assert_eq!(expired_sorted(&mut wheel), vec!["foo"]); // tick 2
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 3 == max_step

        wheel.set("foo", TtlAction::Steps(1));
        assert!(expired_sorted(&mut wheel).is_empty()); // tick 4: normalizes, then flushes
        let mut expired = expired_sorted(&mut wheel); // tick 5
        expired.sort_unstable();
        assert_eq!(expired, vec!["bar", "foo"]);
    }

    #[test]
    fn normalization_keeps_bucket_indices_bounded() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::new(4);
        wheel.set("a", TtlAction::Steps(4));
        for _ in 0..20 {
            wheel.next_step();
            for &tick in wheel.buckets.keys() {
                assert!(tick <= wheel.max_step);
            }
        }
    }

    #[test]
    fn due_and_buckets_stay_mutually_consistent() {
        let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::new(6);
        for (key, steps) in [("a", 1u64), ("b", 3), ("c", 5), ("d", 2)] {
            wheel.set(key, TtlAction::Steps(steps));
        }

        for _ in 0..30 {
            wheel.next_step();
            for (key, &(tick, _)) in &wheel.due {
                assert!(
                    wheel.buckets.get(&tick).is_some_and(|set| set.contains(key)),
                    "due[{key:?}] points at tick {tick} but that bucket doesn't contain it"
                );
            }
            for (&tick, keys) in &wheel.buckets {
                for key in keys {
                    assert_eq!(wheel.due.get(key).map(|&(t, _)| t), Some(tick));
                }
            }
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Set { key: u8, steps: u16 },
            Renew { key: u8 },
            Tick,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..8, 0u16..20).prop_map(|(key, steps)| Op::Set { key, steps }),
                (0u8..8).prop_map(|key| Op::Renew { key }),
                Just(Op::Tick),
            ]
        }

        proptest! {
            /// Property 1: `due`/`buckets` stay mutually consistent at every
            /// observable state, for any interleaving of `set`/`next_step`.
            #[test]
            fn wheel_stays_internally_consistent(ops in proptest::collection::vec(op_strategy(), 0..200)) {
                let mut wheel: ExpiryWheel<u8> = ExpiryWheel::new(31);

                for op in ops {
                    match op {
                        Op::Set { key, steps } => wheel.set(key, TtlAction::Steps(steps as u64)),
                        Op::Renew { key } => wheel.set(key, TtlAction::Renew),
                        Op::Tick => {
                            wheel.next_step();
                        }
                    }

                    for (key, &(tick, _)) in &wheel.due {
                        prop_assert!(wheel.buckets.get(&tick).is_some_and(|s| s.contains(key)));
                    }
                    for (&tick, keys) in &wheel.buckets {
                        prop_assert!(tick <= wheel.max_step);
                        for key in keys {
                            prop_assert_eq!(wheel.due.get(key).map(|&(t, _)| t), Some(tick));
                        }
                    }
                }
            }

            /// Property 4: `Steps(0)` never appears in any later expired set.
            #[test]
            fn zero_ttl_is_never_evicted(extra_ticks in 0usize..50) {
                let mut wheel: ExpiryWheel<&'static str> = ExpiryWheel::unbounded();
                wheel.set("never", TtlAction::Steps(0));
                for _ in 0..extra_ticks {
                    let expired = wheel.next_step();
                    prop_assert!(!expired.contains("never"));
                }
            }
        }
    }
}
