//! Benchmark for network-number allocation
//!
//! Claims against a namespace where almost every number is already taken,
//! so each claim scans most of the range.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meshdb_core::model::{Install, InstallStatus, Node, NodeStatus};
use meshdb_core::{MemoryStore, NumberAllocator, NumberRegistry, NumberSpace};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Store with every assignable number below `free_from` in use,
/// alternating between nodes and installs
fn dense_store(free_from: u32) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let space = NumberSpace::default();
    for n in space.assign_min()..free_from {
        if n % 2 == 0 {
            let _ = store.put_node(Node::new(Some(n), NodeStatus::Active));
        } else {
            let _ = store.put_install(Install::new(n, InstallStatus::Active));
        }
    }
    store
}

fn bench_claim_next_available(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("allocator");
    group.throughput(Throughput::Elements(1));

    for occupied in [1_000u32, 4_000, 8_000] {
        let store = dense_store(NumberSpace::default().assign_min() + occupied);
        let allocator = NumberAllocator::new(store.clone(), NumberSpace::default());

        group.bench_with_input(
            BenchmarkId::new("claim_next_available", occupied),
            &occupied,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    let number = allocator.claim_next_available().await.unwrap();
                    black_box(number);
                    store.release_claim(number).await.unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_validate_candidate(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("allocator");
    group.throughput(Throughput::Elements(1));

    let store = dense_store(5_000);
    let allocator = NumberAllocator::new(store, NumberSpace::default());

    group.bench_function("validate_free_candidate", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(allocator.validate_candidate(black_box(6_000), None).await.unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_claim_next_available, bench_validate_candidate);
criterion_main!(benches);
