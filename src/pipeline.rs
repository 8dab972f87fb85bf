//! The training run: load the CSV, split, fit the forest, evaluate on the
//! held-out rows, then write the model and a metrics snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, TrainConfig};
use crate::dataset::Dataset;
use crate::dataset::loader::{DatasetError, load_csv};
use crate::dataset::split::{SplitError, stratified_split};
use crate::ml::forest::{RandomForestModel, TrainError, train_random_forest};
use crate::ml::metrics::{ClassificationReport, ConfusionMatrix, MetricsError, roc_auc};
use crate::ml::persist::{PersistError, save_model};

/// Number of features listed in the metrics snapshot.
pub const TOP_FEATURES: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("Model expects {expected} features, dataset has {found}")]
    FeatureCount { expected: usize, found: usize },
    #[error("Feature {position} is '{found}', model was fitted with '{expected}'")]
    FeatureName {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Failed to serialize metrics: {0}")]
    SerializeMetrics(serde_json::Error),
    #[error("Failed to write metrics to {path}: {source}")]
    WriteMetrics {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Held-out performance of a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub accuracy: f64,
    /// ROC-AUC of the positive-class probability.
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

/// Importance of one feature, as written to the metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f32,
}

/// JSON record of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub dataset: PathBuf,
    pub target: String,
    pub n_rows: usize,
    pub n_features: usize,
    pub class_counts: BTreeMap<i64, usize>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_trees: usize,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub report: ClassificationReport,
    pub top_features: Vec<FeatureImportance>,
}

/// Everything a caller may want after a run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub model: RandomForestModel,
    pub evaluation: Evaluation,
    pub snapshot: MetricsSnapshot,
    pub model_path: PathBuf,
    pub metrics_path: PathBuf,
}

/// Ensure `dataset` carries the model's feature columns in fit order.
pub fn check_features(model: &RandomForestModel, dataset: &Dataset) -> Result<(), PipelineError> {
    if model.n_features() != dataset.n_features() {
        return Err(PipelineError::FeatureCount {
            expected: model.n_features(),
            found: dataset.n_features(),
        });
    }
    let mismatch = model
        .feature_names
        .iter()
        .zip(&dataset.feature_names)
        .position(|(expected, found)| expected != found);
    if let Some(position) = mismatch {
        return Err(PipelineError::FeatureName {
            position,
            expected: model.feature_names[position].clone(),
            found: dataset.feature_names[position].clone(),
        });
    }
    Ok(())
}

/// Score `model` on `dataset`.
pub fn evaluate(model: &RandomForestModel, dataset: &Dataset) -> Result<Evaluation, PipelineError> {
    check_features(model, dataset)?;
    let (predicted, scores) = model.predict_matrix(&dataset.features);
    let roc_auc = roc_auc(&dataset.labels, &scores, model.positive_class())?;

    let classes = model
        .classes
        .iter()
        .chain(&dataset.labels)
        .copied()
        .collect();
    let mut confusion = ConfusionMatrix::new(classes);
    for (&truth, &pred) in dataset.labels.iter().zip(&predicted) {
        confusion.add(truth, pred);
    }
    let report = ClassificationReport::from_confusion(&confusion);
    Ok(Evaluation {
        accuracy: report.accuracy,
        roc_auc,
        confusion,
        report,
    })
}

/// Run the full training pipeline described by `config`.
///
/// Paths in `config` are used as given; resolve them first with
/// [`TrainConfig::resolved`].
pub fn run_training(config: &TrainConfig) -> Result<TrainingSummary, PipelineError> {
    config.validate()?;

    let dataset = load_csv(&config.data.path, &config.data.target)?;
    info!(
        "Loaded {} rows x {} features from {}",
        dataset.n_rows(),
        dataset.n_features(),
        config.data.path.display()
    );
    for (label, share) in dataset.label_distribution() {
        info!("{} = {}: {:.3}", dataset.target, label, share);
    }

    let split = stratified_split(&dataset.labels, &config.split)?;
    let train = dataset.subset(&split.train);
    let test = dataset.subset(&split.test);
    info!(
        "Split {} train / {} test rows (test_fraction={}, seed={})",
        train.n_rows(),
        test.n_rows(),
        config.split.test_fraction,
        config.split.seed
    );

    info!("Training random forest with {} trees", config.forest.n_trees);
    let model = train_random_forest(&train, &config.forest)?;
    info!("Training complete");

    let evaluation = evaluate(&model, &test)?;
    info!(
        "Test accuracy {:.4}, ROC AUC {:.4}",
        evaluation.accuracy, evaluation.roc_auc
    );

    save_model(&config.output.model_path, &model)?;
    info!("Saved model to {}", config.output.model_path.display());

    let snapshot = MetricsSnapshot {
        dataset: config.data.path.clone(),
        target: dataset.target.clone(),
        n_rows: dataset.n_rows(),
        n_features: dataset.n_features(),
        class_counts: dataset.class_counts(),
        train_rows: train.n_rows(),
        test_rows: test.n_rows(),
        n_trees: model.trees.len(),
        accuracy: evaluation.accuracy,
        roc_auc: evaluation.roc_auc,
        report: evaluation.report.clone(),
        top_features: model
            .ranked_features()
            .into_iter()
            .take(TOP_FEATURES)
            .map(|(name, importance)| FeatureImportance {
                name: name.to_string(),
                importance,
            })
            .collect(),
    };
    write_snapshot(&config.output.metrics_path, &snapshot)?;
    info!("Wrote metrics to {}", config.output.metrics_path.display());

    Ok(TrainingSummary {
        model,
        evaluation,
        snapshot,
        model_path: config.output.model_path.clone(),
        metrics_path: config.output.metrics_path.clone(),
    })
}

fn write_snapshot(path: &Path, snapshot: &MetricsSnapshot) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(snapshot).map_err(PipelineError::SerializeMetrics)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::WriteMetrics {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| PipelineError::WriteMetrics {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureMatrix;
    use crate::ml::forest::{DecisionTree, MODEL_VERSION, Node};

    fn stump_model() -> RandomForestModel {
        RandomForestModel {
            model_version: MODEL_VERSION,
            feature_names: vec!["age".into(), "sbp".into()],
            classes: vec![0, 1],
            trees: vec![DecisionTree {
                nodes: vec![
                    Node::Split {
                        feature: 0,
                        threshold: 50.0,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf {
                        distribution: vec![0.9, 0.1],
                    },
                    Node::Leaf {
                        distribution: vec![0.2, 0.8],
                    },
                ],
            }],
            feature_importances: vec![1.0, 0.0],
        }
    }

    fn dataset(names: &[&str], rows: &[Vec<f32>], labels: Vec<i64>) -> Dataset {
        Dataset {
            feature_names: names.iter().map(|n| n.to_string()).collect(),
            target: "cvd_any".into(),
            features: FeatureMatrix::from_rows(rows).unwrap(),
            labels,
        }
    }

    #[test]
    fn evaluate_scores_held_out_rows() {
        let data = dataset(
            &["age", "sbp"],
            &[
                vec![30.0, 120.0],
                vec![40.0, 130.0],
                vec![60.0, 150.0],
                vec![70.0, 110.0],
                vec![65.0, 125.0],
            ],
            vec![0, 0, 1, 1, 0],
        );
        let eval = evaluate(&stump_model(), &data).unwrap();
        assert!((eval.accuracy - 0.8).abs() < 1e-12);
        // Positives score 0.8; negatives score 0.1, 0.1, 0.8.
        assert!((eval.roc_auc - (2.0 + 2.0 + 0.5 + 0.5) / 6.0).abs() < 1e-12);
        assert_eq!(eval.confusion.get(0, 1), 1);
        assert_eq!(eval.confusion.get(1, 1), 2);
        assert_eq!(eval.report.per_class.len(), 2);
    }

    #[test]
    fn evaluate_rejects_reordered_features() {
        let data = dataset(&["sbp", "age"], &[vec![120.0, 30.0]], vec![0]);
        assert!(matches!(
            evaluate(&stump_model(), &data),
            Err(PipelineError::FeatureName { position: 0, .. })
        ));
        let data = dataset(&["age"], &[vec![30.0]], vec![0]);
        assert!(matches!(
            evaluate(&stump_model(), &data),
            Err(PipelineError::FeatureCount {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn evaluate_requires_both_classes() {
        let data = dataset(&["age", "sbp"], &[vec![30.0, 1.0], vec![60.0, 1.0]], vec![1, 1]);
        assert!(matches!(
            evaluate(&stump_model(), &data),
            Err(PipelineError::Metrics(MetricsError::SingleClass(1)))
        ));
    }
}
