//! Benchmarks for the cache engine.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memstash::{Cache, CacheConfig};

fn roomy_config() -> CacheConfig {
    CacheConfig::new().memory_limit(64 << 20).shard_count(4).build()
}

/// Benchmark single-threaded get/insert operations.
fn bench_single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");

    let cache = Cache::new(roomy_config());

    // Pre-populate some keys
    for i in 0..10_000 {
        cache.insert(format!("key_{}", i), "0", "", format!("value_{}", i), 0);
    }

    group.bench_function("get_existing", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = format!("key_{}", i % 10_000);
            black_box(cache.get(key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = format!("missing_{}", i);
            black_box(cache.get(key));
            i += 1;
        });
    });

    group.bench_function("insert_new", |b| {
        let cache = Cache::new(roomy_config());
        let mut i = 0;
        b.iter(|| {
            cache.insert(format!("new_key_{}", i), "0", "", "value", 0);
            i += 1;
        });
    });

    group.bench_function("insert_existing", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = format!("key_{}", i % 10_000);
            cache.insert(key, "0", "", "updated_value", 0);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent operations.
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2, 4, 8].iter() {
        let cache = Cache::new(roomy_config());

        // Pre-populate
        for i in 0..10_000 {
            cache.insert(format!("key_{}", i), "0", "", format!("value_{}", i), 0);
        }

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(
            BenchmarkId::new("mixed_ops", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let cache = cache.clone();
                            std::thread::spawn(move || {
                                for i in 0..1000 {
                                    let key = format!("key_{}", (t * 1000 + i) % 10_000);
                                    if i % 5 == 0 {
                                        cache.insert(key, "0", "", "value", 0);
                                    } else {
                                        black_box(cache.get(key));
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark TTL stores.
fn bench_ttl(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl");

    let cache = Cache::new(roomy_config());

    group.bench_function("insert_with_ttl", |b| {
        let mut i = 0;
        b.iter(|| {
            cache.insert(format!("ttl_key_{}", i), "0", "", "value", 300);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark inserts into a budget-bound cache that constantly evicts.
fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    let config = CacheConfig::new().memory_limit(64 << 10).shard_count(4).build();
    let cache = Cache::new(config);

    // Fill past the budget so every insert has to make room
    for i in 0..2000 {
        cache.insert(format!("key_{}", i), "0", "", "value", 0);
    }

    group.bench_function("insert_with_eviction", |b| {
        let mut i = 2000;
        b.iter(|| {
            cache.insert(format!("key_{}", i), "0", "", "value", 0);
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_threaded,
    bench_concurrent,
    bench_ttl,
    bench_eviction,
);
criterion_main!(benches);
