//! Benchmarks for batch analysis and strategy scoring.
#![allow(
    missing_docs,
    clippy::unwrap_used,
    clippy::absolute_paths,
    clippy::min_ident_chars,
    clippy::missing_panics_doc,
    reason = "Benchmark code has different conventions"
)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pivot_core::{
    BatchDescriptor, FieldSpec, RequestShape, ScoringWeights, StrategyKind, SystemMetrics,
};
use pivot_engine::{AggregateMetrics, ModelAnalyzer, StrategyFactory};

fn shaped_batch(fields: usize) -> BatchDescriptor {
    let shape = (0..fields)
        .map(|index| {
            let field = FieldSpec::new(format!("field_{index}"));
            if index % 3 == 0 {
                field.depending_on("field_0")
            } else {
                field
            }
        })
        .collect();
    BatchDescriptor::new("bench").with_request_shape(RequestShape::new(shape))
}

/// Benchmark analysis plus scoring of every strategy
fn bench_strategy_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_scoring");
    let analyzer = ModelAnalyzer::new();
    let metrics = SystemMetrics::default().with_load(0.4).with_memory(0.3);
    let weights = ScoringWeights::default();

    for fields in [0, 8, 64] {
        let batch = shaped_batch(fields);
        group.throughput(Throughput::Elements(StrategyKind::ALL.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &batch, |b, batch| {
            b.iter(|| {
                let analysis = analyzer.analyze(black_box(batch));
                analyzer.compute_strategy_scores(
                    &analysis,
                    black_box(&metrics),
                    &StrategyKind::ALL,
                    &weights,
                )
            });
        });
    }

    group.finish();
}

/// Benchmark switch decisions under each trigger
fn bench_switch_decision(c: &mut Criterion) {
    let factory = StrategyFactory::default();
    let batch = shaped_batch(8);
    let observations = [
        AggregateMetrics::default(),
        AggregateMetrics {
            partial_failure_rate: 0.5,
            ..AggregateMetrics::default()
        },
        AggregateMetrics {
            system_load: 0.9,
            ..AggregateMetrics::default()
        },
        AggregateMetrics {
            memory_usage: 0.9,
            ..AggregateMetrics::default()
        },
    ];

    c.bench_function("switch_decision", |b| {
        b.iter(|| {
            for observed in &observations {
                black_box(factory.should_switch_strategy(
                    StrategyKind::Concurrent,
                    &batch,
                    black_box(observed),
                ));
            }
        });
    });
}

criterion_group!(benches, bench_strategy_scoring, bench_switch_decision);
criterion_main!(benches);
