use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::mpsc::channel;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Dataset;

use super::grow::{GrowContext, GrownTree, grow_tree};
use super::model::{MODEL_VERSION, RandomForestModel};

/// Number of features examined per split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least 1.
    Sqrt,
    /// `floor(log2(n_features))`, at least 1.
    Log2,
    /// Every feature.
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let count = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::All => n_features,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestOptions {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum tree depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    /// Minimum number of samples in each leaf.
    pub min_samples_leaf: usize,
    /// Minimum number of samples required to split a node.
    pub min_samples_split: usize,
    /// Features examined per split.
    pub max_features: MaxFeatures,
    /// Train each tree on a bootstrap resample of the rows.
    pub bootstrap: bool,
    /// Seed for per-tree seeds.
    pub seed: u64,
    /// Worker threads; 0 uses every available core.
    pub n_jobs: usize,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: None,
            min_samples_leaf: 5,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
            n_jobs: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Empty dataset")]
    EmptyDataset,
    #[error("Mismatched feature/label lengths: {rows} rows, {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("Need at least 2 classes, found only label {0}")]
    SingleClass(i64),
    #[error("Invalid option {name}: {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },
    #[error("Tree {0} was not produced by any worker")]
    MissingTree(usize),
}

/// Train a random forest classifier.
///
/// Tree `i` is grown from the `i`-th seed drawn from `options.seed`, so the
/// fitted model is identical for any `n_jobs`.
pub fn train_random_forest(
    dataset: &Dataset,
    options: &ForestOptions,
) -> Result<RandomForestModel, TrainError> {
    validate_options(options)?;
    let n = dataset.n_rows();
    if dataset.features.n_rows() != n {
        return Err(TrainError::LengthMismatch {
            rows: dataset.features.n_rows(),
            labels: n,
        });
    }
    if n == 0 {
        return Err(TrainError::EmptyDataset);
    }
    let classes: Vec<i64> = dataset.class_counts().into_keys().collect();
    if classes.len() < 2 {
        return Err(TrainError::SingleClass(classes[0]));
    }
    let y: Vec<usize> = dataset
        .labels
        .iter()
        .map(|label| classes.partition_point(|class| class < label))
        .collect();

    let n_features = dataset.n_features();
    let ctx = GrowContext {
        features: &dataset.features,
        y: &y,
        n_classes: classes.len(),
        max_features: options.max_features.resolve(n_features),
        max_depth: options.max_depth,
        min_samples_leaf: options.min_samples_leaf,
        min_samples_split: options.min_samples_split,
        bootstrap: options.bootstrap,
    };

    let mut master = StdRng::seed_from_u64(options.seed);
    let seeds: Vec<u64> = (0..options.n_trees).map(|_| master.random()).collect();
    let worker_count = resolve_jobs(options.n_jobs).min(options.n_trees).max(1);
    tracing::debug!(
        trees = options.n_trees,
        workers = worker_count,
        max_features = ctx.max_features,
        "Growing random forest"
    );

    let grown = grow_all(&ctx, seeds, worker_count)?;
    let feature_importances = average_importances(&grown, n_features);
    let trees = grown.into_iter().map(|g| g.tree).collect();

    Ok(RandomForestModel {
        model_version: MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        classes,
        trees,
        feature_importances,
    })
}

fn validate_options(options: &ForestOptions) -> Result<(), TrainError> {
    if options.n_trees == 0 {
        return Err(TrainError::InvalidOption {
            name: "n_trees",
            reason: "must be at least 1",
        });
    }
    if options.min_samples_leaf == 0 {
        return Err(TrainError::InvalidOption {
            name: "min_samples_leaf",
            reason: "must be at least 1",
        });
    }
    if options.min_samples_split < 2 {
        return Err(TrainError::InvalidOption {
            name: "min_samples_split",
            reason: "must be at least 2",
        });
    }
    Ok(())
}

fn resolve_jobs(n_jobs: usize) -> usize {
    if n_jobs > 0 {
        return n_jobs;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn grow_all(
    ctx: &GrowContext<'_>,
    seeds: Vec<u64>,
    worker_count: usize,
) -> Result<Vec<GrownTree>, TrainError> {
    let n_trees = seeds.len();
    let queue = Mutex::new(seeds.into_iter().enumerate().collect::<VecDeque<_>>());
    let (tx, rx) = channel();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let queue = &queue;
            let tx = tx.clone();
            scope.spawn(move || {
                loop {
                    let work = {
                        let mut guard = match queue.lock() {
                            Ok(guard) => guard,
                            Err(_) => return,
                        };
                        guard.pop_front()
                    };
                    let Some((tree_idx, seed)) = work else {
                        break;
                    };
                    if tx.send((tree_idx, grow_tree(ctx, seed))).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<GrownTree>> = (0..n_trees).map(|_| None).collect();
    for (tree_idx, grown) in rx {
        slots[tree_idx] = Some(grown);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.ok_or(TrainError::MissingTree(idx)))
        .collect()
}

fn average_importances(grown: &[GrownTree], n_features: usize) -> Vec<f32> {
    let mut totals = vec![0.0f64; n_features];
    for tree in grown {
        let sum: f64 = tree.importances.iter().sum();
        if sum <= 0.0 {
            continue;
        }
        for (total, &value) in totals.iter_mut().zip(&tree.importances) {
            *total += value / sum;
        }
    }
    let grand_total: f64 = totals.iter().sum();
    if grand_total > 0.0 {
        for total in &mut totals {
            *total /= grand_total;
        }
    }
    totals.into_iter().map(|v| v as f32).collect()
}
