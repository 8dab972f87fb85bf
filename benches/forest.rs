use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cvd_forest::dataset::{Dataset, FeatureMatrix};
use cvd_forest::ml::forest::{ForestOptions, train_random_forest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROWS: usize = 2_000;
const FEATURES: usize = 12;

fn synthetic(rows: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(7);
    let mut features = FeatureMatrix::with_columns(FEATURES);
    let mut labels = Vec::with_capacity(rows);
    let mut row = vec![0.0f32; FEATURES];
    for _ in 0..rows {
        for value in &mut row {
            *value = rng.random_range(0.0..1.0);
        }
        let score = row[0] + 0.5 * row[1] - 0.3 * row[2] + rng.random_range(-0.2..0.2);
        features.push_row(&row);
        labels.push(i64::from(score > 0.6));
    }
    Dataset {
        feature_names: (0..FEATURES).map(|idx| format!("f{idx}")).collect(),
        target: "cvd_any".to_string(),
        features,
        labels,
    }
}

fn bench_fit(c: &mut Criterion) {
    let data = synthetic(ROWS);
    let mut group = c.benchmark_group("forest_fit");
    group.sample_size(10);
    for n_trees in [10usize, 50] {
        let options = ForestOptions {
            n_trees,
            ..ForestOptions::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(n_trees), &options, |b, options| {
            b.iter(|| train_random_forest(black_box(&data), options).expect("fit"));
        });
    }
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let data = synthetic(ROWS);
    let options = ForestOptions {
        n_trees: 100,
        ..ForestOptions::default()
    };
    let model = train_random_forest(&data, &options).expect("fit");
    c.bench_with_input(
        BenchmarkId::new("forest_predict_matrix", ROWS),
        &data.features,
        |b, features| {
            b.iter(|| model.predict_matrix(black_box(features)));
        },
    );
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);
