//! Benchmarks for candidate generation
//!
//! Run with: cargo bench --package sources
//!
//! Uses the sample dataset under data/sample.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use data_loader::{DataIndex, InMemoryStore, StoreReader};
use sources::{AggregationConfig, CandidateGenerator, GenerateOptions, build_feature_view};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

const USER: &str = "u001";

fn load_store() -> Arc<dyn StoreReader> {
    let data_dir = Path::new("../../data/sample");
    let index = DataIndex::load_from_dir(data_dir).expect("Failed to load sample data");
    Arc::new(InMemoryStore::new(Arc::new(index)))
}

fn bench_build_feature_view(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to start runtime");
    let store = load_store();
    let config = AggregationConfig::default();

    c.bench_function("build_feature_view", |b| {
        b.iter(|| {
            let view = rt
                .block_on(build_feature_view(store.as_ref(), black_box(USER), &config))
                .unwrap();
            black_box(view)
        })
    });
}

fn bench_generate_candidates(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to start runtime");
    let store = load_store();
    let view = rt
        .block_on(build_feature_view(store.as_ref(), USER, &AggregationConfig::default()))
        .expect("Failed to build feature view");
    let generator = CandidateGenerator::new(store.clone());
    let open = GenerateOptions::new(40);
    let scoped = GenerateOptions::new(40).with_category(Some("electronics".to_string()));

    c.bench_function("generate_candidates", |b| {
        b.iter(|| {
            let candidates = rt
                .block_on(generator.generate(black_box(&view), black_box(&open)))
                .unwrap();
            black_box(candidates)
        })
    });

    c.bench_function("generate_candidates_in_category", |b| {
        b.iter(|| {
            let candidates = rt
                .block_on(generator.generate(black_box(&view), black_box(&scoped)))
                .unwrap();
            black_box(candidates)
        })
    });
}

criterion_group!(benches, bench_build_feature_view, bench_generate_candidates);
criterion_main!(benches);
