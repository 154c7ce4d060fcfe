// Region Selection Benchmarks
//
// Measures the cost of one selection round:
// - pure least-loaded selection over precomputed samples
// - full consume (peek all regions + consume one) on the in-memory store

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use region_limiter::rate_limit::{
    select_least_loaded, MemoryQuotaStore, QuotaSnapshot, RandomTieBreaker, RegionLimiterConfig,
    RegionSelector, TrafficSample,
};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn samples(n: usize) -> Vec<TrafficSample> {
    (0..n)
        .map(|i| {
            let snapshot = QuotaSnapshot {
                remaining: (i % 7) as u32,
                capacity: 10,
                ms_before_next: (i % 3) as u64 * 1000,
            };
            TrafficSample::from_snapshot(format!("region-{}", i), &snapshot)
        })
        .collect()
}

/// Benchmark: selection over precomputed samples
fn bench_select_least_loaded(c: &mut Criterion) {
    let breaker = RandomTieBreaker::with_seed(1);
    let mut group = c.benchmark_group("select_least_loaded");

    for n in [3usize, 16, 128] {
        let samples = samples(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &samples, |b, samples| {
            b.iter(|| black_box(select_least_loaded(black_box(samples), &breaker)));
        });
    }
    group.finish();
}

/// Benchmark: full consume round against the in-memory store
fn bench_consume(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let selector = rt.block_on(async {
        let store = Arc::new(MemoryQuotaStore::new());
        let mut selector =
            RegionSelector::with_store(RegionLimiterConfig::new("bench"), store).unwrap();
        for i in 0..3 {
            selector
                .register(&format!("us-west{}", i + 1), u32::MAX, 3600)
                .await
                .unwrap();
        }
        selector
    });

    c.bench_function("consume_three_regions", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(selector.consume().await.unwrap());
        });
    });
}

criterion_group!(benches, bench_select_least_loaded, bench_consume);
criterion_main!(benches);
