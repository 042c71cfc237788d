//! # Cache Benchmark Harness
//!
//! Purpose: provide a dependency-free, repeatable benchmark driver for
//! `ttlkv-wheel` and `ttlkv-core` so baseline throughput can be compared
//! over time. Mirrors the teacher's own `bench_engine` binary
//! (`hkv-engine/src/bin/bench_engine.rs`): fixed PRNG seeds, pre-built
//! workload buffers, and a direct call into the concrete type to avoid
//! dynamic dispatch on the hot path.
//!
//! ## Design Principles
//! 1. **Deterministic workload**: a fixed-seed PRNG keeps runs comparable.
//! 2. **Allocation control**: keys are pre-built to keep setup off the hot
//!    loop.
//! 3. **Two hard-engineering surfaces, two benches**: `bench_wheel`
//!    measures tick throughput on `ExpiryWheel` alone (single-threaded, no
//!    `tokio` runtime needed); `bench_facade` measures `StoreFacade`
//!    op/s under concurrent, contended access across spawned tasks.

use std::env;
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use ttlkv_common::{CacheConfig, TtlAction};
use ttlkv_core::StoreFacade;
use ttlkv_wheel::ExpiryWheel;

const DEFAULT_KEY_COUNT: usize = 1 << 16;
const DEFAULT_OP_COUNT: usize = 1_000_000;
const DEFAULT_TASK_COUNT: usize = 8;

struct BenchConfig {
    requested_keys: usize,
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    task_count: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let task_count = parse_usize(args.next(), DEFAULT_TASK_COUNT).max(1);

        let key_count = normalize_power_of_two(requested_keys);
        let key_mask = key_count - 1;

        BenchConfig {
            requested_keys,
            key_count,
            key_mask,
            op_count,
            task_count,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

/// Tiny deterministic PRNG used to avoid external dependencies.
///
/// XorShift is fast enough for benchmarks and keeps the workload
/// reproducible across runs.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn build_keys(count: usize, seed: u64) -> Vec<u64> {
    let mut rng = XorShift64::new(seed);
    (0..count).map(|_| rng.next_u64()).collect()
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)");
}

fn main() -> Result<()> {
    let config = BenchConfig::from_args();

    println!(
        "keys: requested={}, actual={}, ops={}, tasks={}",
        config.requested_keys, config.key_count, config.op_count, config.task_count
    );

    bench_wheel(&config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(bench_facade(&config))?;

    Ok(())
}

/// Measures `ExpiryWheel::next_step` throughput with every key holding a
/// short, staggered TTL so each tick sweeps a realistic-sized batch rather
/// than either an empty or an all-at-once bucket.
fn bench_wheel(config: &BenchConfig) {
    let mut wheel: ExpiryWheel<u64> = ExpiryWheel::unbounded();
    let keys = build_keys(config.key_count, 0xA5A5_A5A5_A5A5_A5A5);

    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    for &key in &keys {
        let steps = 1 + (rng.next_u64() % 64);
        wheel.set(key, TtlAction::Steps(steps));
    }

    let ticks = 128u64;
    let start = Instant::now();
    let mut swept = 0usize;
    for _ in 0..ticks {
        let expired = wheel.next_step();
        swept += expired.len();
        black_box(&expired);
    }
    let elapsed = start.elapsed();

    println!("wheel: {ticks} ticks, {swept} keys swept");
    report("WHEEL_TICK", ticks as usize, elapsed);
}

/// Measures `StoreFacade` op/s under contention: `task_count` tasks each
/// issue a mix of `get`/`put`/`isolated` calls against a shared key space,
/// so most row-lock acquisitions collide with another task's in-flight
/// operation.
async fn bench_facade(config: &BenchConfig) -> Result<()> {
    let cache_config = CacheConfig::default();
    let (facade, owner) =
        StoreFacade::<u64, u64>::with_default_store(cache_config, None, "bench_cache")
            .map_err(|err| anyhow::anyhow!("failed to build cache: {err}"))?;
    let facade = Arc::new(facade);

    let keys = build_keys(config.key_count, 0x5A5A_5A5A_5A5A_5A5A);
    for (idx, &key) in keys.iter().enumerate() {
        facade.put(key, idx as u64).await?;
    }

    let ops_per_task = config.op_count / config.task_count;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(config.task_count);
    for task_idx in 0..config.task_count {
        let facade = Arc::clone(&facade);
        let keys = keys.clone();
        let mask = config.key_mask;
        let seed = 0x0FED_CBA9_8765_4321u64 ^ (task_idx as u64);

        handles.push(tokio::spawn(async move {
            let mut rng = XorShift64::new(seed);
            for i in 0..ops_per_task {
                let idx = rng.next_index(mask);
                let key = keys[idx];
                if i % 4 == 0 {
                    let holder = facade
                        .isolated(key, Some(Duration::from_millis(50)), || async { i as u64 })
                        .await;
                    black_box(holder.ok());
                } else {
                    let value = facade.get(&key);
                    black_box(value);
                }
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    let elapsed = start.elapsed();
    let total_ops = ops_per_task * config.task_count;
    report("FACADE_MIXED", total_ops, elapsed);

    owner.shutdown().await;
    Ok(())
}
