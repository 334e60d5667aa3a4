//! BoundedCache benchmarks.
//!
//! Run with: `cargo bench --bench bounded_cache`
//!
//! Measures set/get latency under both eviction policies, with and without
//! eviction pressure.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use kvfacade::cache::{BoundedCache, EvictionPolicy};
use serde_json::{json, Value};

const KEYS: u64 = 4_096;

fn filled(max_bytes: usize, policy: EvictionPolicy) -> BoundedCache<Value> {
    let mut cache = BoundedCache::new(max_bytes, policy);
    for i in 0..KEYS {
        cache.set(format!("key-{i}"), json!({ "i": i }));
    }
    cache
}

// ============================================================================
// Writes
// ============================================================================

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_set");
    group.throughput(Throughput::Elements(KEYS));

    for (name, policy) in [("lru", EvictionPolicy::Lru), ("fifo", EvictionPolicy::Fifo)] {
        group.bench_function(format!("{name}_unbounded"), |b| {
            b.iter_batched(
                || BoundedCache::<Value>::new(0, policy),
                |mut cache| {
                    for i in 0..KEYS {
                        cache.set(format!("key-{i}"), json!({ "i": i }));
                    }
                    black_box(cache.bytes_used())
                },
                BatchSize::SmallInput,
            )
        });

        // Budget holds roughly a quarter of the keys.
        group.bench_function(format!("{name}_evicting"), |b| {
            b.iter_batched(
                || BoundedCache::<Value>::new(16 * 1024, policy),
                |mut cache| {
                    for i in 0..KEYS {
                        cache.set(format!("key-{i}"), json!({ "i": i }));
                    }
                    black_box(cache.metrics().evictions)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Reads
// ============================================================================

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_get");
    group.throughput(Throughput::Elements(KEYS));

    for (name, policy) in [("lru", EvictionPolicy::Lru), ("fifo", EvictionPolicy::Fifo)] {
        let mut cache = filled(0, policy);
        let keys: Vec<String> = (0..KEYS).map(|i| format!("key-{i}")).collect();
        group.bench_function(name, |b| {
            b.iter(|| {
                for key in &keys {
                    black_box(cache.get(key));
                }
            })
        });
    }

    group.finish();
}

fn bench_keys_glob(c: &mut Criterion) {
    let cache = filled(0, EvictionPolicy::Lru);
    c.bench_function("bounded_keys_glob", |b| {
        b.iter(|| black_box(cache.keys(black_box("key-1*"))))
    });
}

criterion_group!(benches, bench_set, bench_get, bench_keys_glob);
criterion_main!(benches);
