//! Benchmarks for evolution operators, engines and metric tracking.

use std::collections::HashMap;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::prelude::*;

use evo_stream::{
    compute::{
        evolution::{
            Combiner, GaussianPerturbator, Operators, Perturbator, Selector, StreamingEngine,
            SyncEngine, TournamentSelector, UniformCrossover,
        },
        tracking::{FitnessAggregator, MetricCollector, WeightedAggregator},
    },
    schema::{Candidate, EngineConfig, GeneBounds, MetricBundle, StreamingConfig},
};

fn bench_operators(c: &mut Criterion) {
    let mut group = c.benchmark_group("operators");
    let mut rng = StdRng::seed_from_u64(1);

    for genes in [8, 64, 512] {
        let bounds = vec![GeneBounds::new(-1.0, 1.0); genes];
        let perturbator = GaussianPerturbator::new(bounds.clone(), 0.1);
        let crossover = UniformCrossover::new(0.5);
        let a: Vec<f64> = (0..genes).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b: Vec<f64> = (0..genes).map(|_| rng.gen_range(-1.0..1.0)).collect();

        group.bench_with_input(BenchmarkId::new("perturb", genes), &genes, |bench, _| {
            let mut genotype = a.clone();
            bench.iter(|| perturbator.perturb(black_box(&mut genotype), 0.1, &mut rng));
        });
        group.bench_with_input(BenchmarkId::new("crossover", genes), &genes, |bench, _| {
            bench.iter(|| crossover.combine(black_box(&[&a, &b]), &mut rng));
        });
    }

    for pool_size in [32, 256] {
        let pool: Vec<Candidate<Vec<f64>, f64>> = (0..pool_size)
            .map(|i| Candidate::scored(vec![0.0; 8], i as f64))
            .collect();
        let selector = TournamentSelector::new(3);
        group.bench_with_input(
            BenchmarkId::new("tournament", pool_size),
            &pool_size,
            |bench, _| {
                bench.iter(|| selector.select(black_box(&pool), 2, &mut rng));
            },
        );
    }

    group.finish();
}

fn bench_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming");

    for pool_size in [32, 256] {
        let config = StreamingConfig {
            engine: EngineConfig {
                pool_size,
                random_seed: Some(3),
                ..Default::default()
            },
            ..Default::default()
        };
        let bounds = vec![GeneBounds::new(0.0, 1.0); 16];
        let operators = Operators::real_valued(&bounds, 0.1, &config.engine).unwrap();
        let engine: StreamingEngine<Vec<f64>, f64> = StreamingEngine::new(config, operators);
        engine.initialize_pool();

        group.bench_with_input(
            BenchmarkId::new("sample_population", pool_size),
            &pool_size,
            |b, _| {
                b.iter(|| engine.sample_population(black_box(8)));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("best_immediate", pool_size),
            &pool_size,
            |b, _| {
                b.iter(|| engine.best_immediate());
            },
        );
    }

    group.finish();
}

fn bench_sync_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_engine");
    group.sample_size(10);

    let bounds = vec![GeneBounds::new(-5.0, 5.0); 8];
    for pool_size in [32, 128] {
        let config = EngineConfig {
            pool_size,
            max_iterations: 20,
            random_seed: Some(9),
            ..Default::default()
        };
        let operators = Operators::real_valued(&bounds, 0.1, &config).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("pool_{}", pool_size)),
            &pool_size,
            |b, _| {
                b.iter(|| {
                    let mut engine = SyncEngine::new(config.clone(), operators.clone());
                    engine
                        .run(|g: &Vec<f64>| -g.iter().map(|x| x * x).sum::<f64>(), None)
                        .map(|r| r.iterations)
                });
            },
        );
    }

    group.finish();
}

fn bench_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking");

    let keys: Vec<String> = (0..8).map(|i| format!("metric_{}", i)).collect();
    let sample: MetricBundle = keys.iter().map(|k| (k.clone(), 0.75)).collect();
    let weights: HashMap<String, f64> = keys.iter().map(|k| (format!("avg_{}", k), 1.0)).collect();
    let aggregator = WeightedAggregator::new(weights);

    group.bench_function("lifetime_120_ticks", |b| {
        let mut collector = MetricCollector::new();
        b.iter(|| {
            collector.reset();
            for _ in 0..120 {
                collector.collect(black_box(&sample), 1.0 / 60.0);
            }
            let metrics = collector.finalize(&MetricBundle::new());
            aggregator.calculate(&metrics, None)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_operators,
    bench_streaming,
    bench_sync_engine,
    bench_tracking
);
criterion_main!(benches);
