//! Throughput Benchmark for VaultKV
//!
//! Measures the sharded store under set, get, and mixed workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use vaultkv::storage::ShardedStore;

fn bench_set(c: &mut Criterion) {
    let store = Arc::new(ShardedStore::new(8));

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store
                .set(
                    format!("key:{i}"),
                    Bytes::from_static(b"small_value"),
                    Duration::ZERO,
                    false,
                )
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from(vec![b'x'; 1024]);
        b.iter(|| {
            store
                .set(format!("key:{i}"), value.clone(), Duration::ZERO, false)
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let store = Arc::new(ShardedStore::new(8));
    for i in 0..10_000 {
        store
            .set(
                format!("key:{i}"),
                Bytes::from_static(b"value"),
                Duration::ZERO,
                false,
            )
            .unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("key:{}", i % 10_000)));
            i += 1;
        });
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| {
            black_box(store.get("missing-key"));
        });
    });

    group.finish();
}

fn bench_mixed(c: &mut Criterion) {
    let store = Arc::new(ShardedStore::new(8));
    for i in 0..1_000 {
        store
            .set(
                format!("key:{i}"),
                Bytes::from_static(b"value"),
                Duration::ZERO,
                false,
            )
            .unwrap();
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    // 9 reads per write, roughly a cache-style ratio
    group.bench_function("read_heavy", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 10 == 0 {
                store
                    .set(
                        format!("key:{}", i % 1_000),
                        Bytes::from_static(b"updated"),
                        Duration::ZERO,
                        false,
                    )
                    .unwrap();
            } else {
                black_box(store.get(&format!("key:{}", i % 1_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_mixed);
criterion_main!(benches);
