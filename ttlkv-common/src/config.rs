//! # Startup Configuration
//!
//! Purpose: Collect the enumerated startup options from `spec.md` §6 into a
//! single, validated, optionally-serializable struct.
//!
//! ## Usage
//!
//! - Use `CacheConfig::default()` for the documented defaults.
//! - Use the `with_*` builder methods to override individual fields.
//! - Call `validate()` before handing the config to a cache constructor;
//!   `ttlkv-core` does this itself, but calling it eagerly surfaces a bad
//!   `lock_shards`/`time_size` value before any background task starts.

use crate::error::CacheError;

/// Startup configuration for a cache instance.
///
/// Mirrors the options table in `spec.md` §6. `serde` support is feature
/// gated so a deployment can load this from a JSON/TOML file without
/// forcing the dependency on embedders that construct it in code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Default TTL in milliseconds for plain (non-`Item`) writes. `0` means
    /// "no expiry".
    pub ttl_ms: u64,
    /// Sweeper tick interval in milliseconds. `None` disables expiry
    /// entirely: no `OwnerLoop` timer is armed and `set`/`Renew` become
    /// no-ops from the wheel's point of view.
    pub ttl_check_ms: Option<u64>,
    /// Whether `get` sends a `Renew` action on every hit.
    pub touch_on_read: bool,
    /// Default wait, in milliseconds, for a blocking `acquire`/`isolated`
    /// call before it surfaces `CacheError::Timeout`.
    pub acquire_lock_timeout_ms: u64,
    /// Bit-width of the wheel's tick counter horizon. Horizon = `2^time_size
    /// - 1`; `next_step` normalizes when `current_step` reaches it.
    pub time_size: u32,
    /// Number of shards in the row-lock table.
    pub lock_shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_ms: 0,
            ttl_check_ms: None,
            touch_on_read: false,
            acquire_lock_timeout_ms: 5_000,
            time_size: 64,
            lock_shards: 256,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_ttl_check_ms(mut self, ttl_check_ms: Option<u64>) -> Self {
        self.ttl_check_ms = ttl_check_ms;
        self
    }

    pub fn with_touch_on_read(mut self, touch_on_read: bool) -> Self {
        self.touch_on_read = touch_on_read;
        self
    }

    pub fn with_acquire_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_lock_timeout_ms = timeout_ms;
        self
    }

    pub fn with_time_size(mut self, time_size: u32) -> Self {
        self.time_size = time_size;
        self
    }

    pub fn with_lock_shards(mut self, lock_shards: usize) -> Self {
        self.lock_shards = lock_shards;
        self
    }

    /// The wheel's horizon (`2^time_size - 1`), saturating at `u64::MAX` for
    /// `time_size >= 64`.
    pub fn horizon(&self) -> u64 {
        if self.time_size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.time_size) - 1
        }
    }

    /// Validates the config, surfacing `CacheError::InvalidStoreConfig` for
    /// combinations that would make construction meaningless rather than
    /// failing later inside the owner loop or lock shard.
    pub fn validate<E>(&self) -> Result<(), CacheError<E>> {
        if self.lock_shards == 0 {
            return Err(CacheError::InvalidStoreConfig(
                "lock_shards must be at least 1".into(),
            ));
        }
        if self.time_size == 0 {
            return Err(CacheError::InvalidStoreConfig(
                "time_size must be at least 1 bit".into(),
            ));
        }
        if let Some(interval) = self.ttl_check_ms {
            if interval == 0 {
                return Err(CacheError::InvalidStoreConfig(
                    "ttl_check_ms must be positive when expiry is enabled".into(),
                ));
            }
        }
        Ok(())
    }

    /// Translates a millisecond TTL into wheel steps: `ceil(ttl_ms /
    /// tick_interval_ms)`, per `spec.md` §4.3 ("TTL normalization"). Returns
    /// `0` (no expiry) if `ttl_check_ms` is unset or `ttl_ms` is `0`.
    pub fn steps_for_ttl_ms(&self, ttl_ms: u64) -> u64 {
        if ttl_ms == 0 {
            return 0;
        }
        match self.ttl_check_ms {
            None => 0,
            Some(interval) => (ttl_ms + interval - 1) / interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_ms, 0);
        assert_eq!(config.ttl_check_ms, None);
        assert!(!config.touch_on_read);
        assert_eq!(config.acquire_lock_timeout_ms, 5_000);
        assert_eq!(config.time_size, 64);
        assert_eq!(config.lock_shards, 256);
    }

    #[test]
    fn zero_shards_is_invalid() {
        let config = CacheConfig::default().with_lock_shards(0);
        assert!(config.validate::<std::convert::Infallible>().is_err());
    }

    #[test]
    fn steps_round_up() {
        let config = CacheConfig::default().with_ttl_check_ms(Some(1_000));
        assert_eq!(config.steps_for_ttl_ms(1), 1);
        assert_eq!(config.steps_for_ttl_ms(1_000), 1);
        assert_eq!(config.steps_for_ttl_ms(1_001), 2);
        assert_eq!(config.steps_for_ttl_ms(0), 0);
    }

    #[test]
    fn horizon_saturates_at_time_size_64() {
        let config = CacheConfig::default().with_time_size(64);
        assert_eq!(config.horizon(), u64::MAX);

        let config = CacheConfig::default().with_time_size(4);
        assert_eq!(config.horizon(), 15);
    }
}
