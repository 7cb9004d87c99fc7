//! Benchmarks for experiment aggregation
//!
//! Run with: cargo bench

use atlas_core::aggregation::{AggregationConfig, ExperimentAggregator};
use atlas_core::model::{Experiment, ExperimentId, GuideCandidate, OffTargetSite, PrincipalId, Sequence};
use atlas_core::store::{InMemoryStore, ReadStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Seed one experiment with `width` sequences, `width` guides per sequence
/// and `width` off-target sites per guide.
fn seed(rt: &Runtime, width: usize) -> (Arc<dyn ReadStore>, ExperimentId, PrincipalId) {
    let store = InMemoryStore::new();
    let owner = PrincipalId::new("bench");
    let experiment = Experiment::new(owner.clone(), "bench");
    let experiment_id = experiment.id;

    rt.block_on(async {
        store.insert_experiment(experiment).await;
        for i in 0..width {
            let sequence = Sequence::new(experiment_id, format!("S{}", i), "ACGTACGTACGTACGTACGT");
            let sequence_id = sequence.id;
            store.insert_sequence(sequence).await;
            for j in 0..width {
                let guide = GuideCandidate::new(sequence_id, "GACGTTACGATCGATCGATC", (j as f64) / (width as f64));
                let guide_id = guide.id;
                store.insert_guide(guide).await;
                for k in 0..width {
                    store
                        .insert_off_target(OffTargetSite::new(guide_id, "chr1", k as f64).with_mismatches(2))
                        .await;
                }
            }
        }
    });

    (Arc::new(store), experiment_id, owner)
}

fn bench_full_detail(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("full_detail");

    for width in [2usize, 4, 8].iter() {
        let (store, experiment_id, owner) = seed(&rt, *width);
        let aggregator = ExperimentAggregator::new(store, AggregationConfig::default());

        group.throughput(Throughput::Elements((width * width * width) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.to_async(&rt).iter(|| async {
                let detail = aggregator
                    .full_detail(black_box(experiment_id), &owner, None)
                    .await
                    .unwrap();
                black_box(detail)
            });
        });
    }
    group.finish();
}

fn bench_shallow(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, experiment_id, owner) = seed(&rt, 4);
    let aggregator = ExperimentAggregator::new(store, AggregationConfig::default());

    c.bench_function("shallow", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(aggregator.shallow(black_box(experiment_id), &owner).await.unwrap())
        });
    });
}

criterion_group!(benches, bench_full_detail, bench_shallow);
criterion_main!(benches);
