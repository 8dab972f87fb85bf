mod support;

use std::path::Path;

use cvd_forest::config;
use cvd_forest::dataset::loader::{DatasetError, load_csv};
use cvd_forest::ml::persist::load_model;
use cvd_forest::pipeline::{MetricsSnapshot, PipelineError, evaluate, run_training};
use support::synthetic::{Cohort, HEADER, project_with_cohort, quick_config};

#[test]
fn training_run_writes_model_and_metrics() {
    let cohort = Cohort::generate(400, 0.3, 11);
    let (dir, paths) = project_with_cohort(&cohort);
    let config = quick_config(&paths, 25);

    let summary = run_training(&config).expect("training run");

    assert_eq!(summary.model_path, dir.path().join("models/rf_cvd.pkl"));
    assert!(summary.model_path.is_file());
    assert_eq!(summary.model.trees.len(), 25);
    assert_eq!(summary.snapshot.n_rows, 400);
    assert_eq!(summary.snapshot.test_rows, 80);
    assert_eq!(summary.snapshot.train_rows, 320);
    assert_eq!(summary.snapshot.class_counts.get(&1), Some(&120));

    let eval = &summary.evaluation;
    assert!((0.0..=1.0).contains(&eval.accuracy));
    assert!((0.0..=1.0).contains(&eval.roc_auc));
    assert!(eval.roc_auc > 0.7, "roc_auc {}", eval.roc_auc);
    assert_eq!(eval.confusion.total(), 80);

    let json = std::fs::read_to_string(&summary.metrics_path).expect("metrics json");
    let snapshot: MetricsSnapshot = serde_json::from_str(&json).expect("parse metrics");
    assert!((snapshot.accuracy - eval.accuracy).abs() < 1e-12);
    assert_eq!(snapshot.top_features.len(), 5);
}

#[test]
fn repeated_runs_are_identical_across_worker_counts() {
    let cohort = Cohort::generate(300, 0.3, 5);
    let (_dir, paths) = project_with_cohort(&cohort);

    let mut single = quick_config(&paths, 15);
    single.forest.n_jobs = 1;
    let mut parallel = single.clone();
    parallel.forest.n_jobs = 4;
    parallel.output.model_path = paths.resolve(Path::new("models/parallel.pkl"));
    parallel.output.metrics_path = paths.resolve(Path::new("models/parallel.json"));

    let a = run_training(&single).expect("single-threaded run");
    let b = run_training(&parallel).expect("parallel run");
    assert_eq!(a.model, b.model);
    assert_eq!(a.evaluation.accuracy, b.evaluation.accuracy);
    assert_eq!(a.evaluation.roc_auc, b.evaluation.roc_auc);
    assert_eq!(a.evaluation.confusion, b.evaluation.confusion);
}

#[test]
fn missing_target_column_fails_before_training() {
    let cohort = Cohort::generate(50, 0.3, 3);
    let (dir, paths) = project_with_cohort(&cohort);
    let mut header = HEADER;
    header[5] = "outcome";
    cohort.write_csv(&dir.path().join("data/ess_model_ready.csv"), &header);

    let config = quick_config(&paths, 5);
    let err = run_training(&config).expect_err("missing target");
    assert!(matches!(
        err,
        PipelineError::Dataset(DatasetError::ColumnNotFound(ref column)) if column == "cvd_any"
    ));
    assert!(!config.output.model_path.exists());
}

#[test]
fn saved_model_reproduces_predictions() {
    let cohort = Cohort::generate(250, 0.3, 21);
    let (_dir, paths) = project_with_cohort(&cohort);
    let config = quick_config(&paths, 10);
    let summary = run_training(&config).expect("training run");

    let loaded = load_model(&summary.model_path).expect("load model");
    assert_eq!(loaded, summary.model);

    let data = load_csv(&config.data.path, "cvd_any").expect("reload csv");
    assert_eq!(
        loaded.predict_matrix(&data.features),
        summary.model.predict_matrix(&data.features)
    );
    let reevaluated = evaluate(&loaded, &data).expect("evaluate");
    assert!((0.0..=1.0).contains(&reevaluated.roc_auc));
}

#[test]
fn permuted_labels_score_near_chance() {
    let mut cohort = Cohort::generate(2000, 0.3, 8);
    cohort.permute_labels(99);
    let (_dir, paths) = project_with_cohort(&cohort);
    let summary = run_training(&quick_config(&paths, 20)).expect("training run");
    let auc = summary.evaluation.roc_auc;
    assert!((auc - 0.5).abs() < 0.15, "roc_auc {auc}");
}

#[test]
fn config_file_overrides_defaults() {
    let cohort = Cohort::generate(200, 0.3, 4);
    let (dir, paths) = project_with_cohort(&cohort);
    std::fs::write(
        dir.path().join("cvd-forest.toml"),
        "[forest]\nn_trees = 7\nmax_depth = 4\n\n[output]\nmodel_path = \"out/model.bin\"\n",
    )
    .expect("write config");

    let config = config::load_or_default(&paths).expect("load config");
    assert_eq!(config.forest.n_trees, 7);
    let summary = run_training(&config).expect("training run");
    assert!(dir.path().join("out/model.bin").is_file());
    assert_eq!(summary.snapshot.n_trees, 7);
    assert!(summary.model.trees.iter().all(|tree| tree.depth() <= 4));
}
