//! Random forest classifier built from CART decision trees.
//!
//! Supports:
//! - Gini-impurity splits with per-node feature subsampling.
//! - Bootstrap resampling per tree, seeded per tree for reproducibility.
//! - Parallel tree growth that does not affect the fitted ensemble.
//! - Missing values (`NaN`) routed to the right child.

mod grow;
mod model;
mod train;
mod tree;

pub use model::{MODEL_VERSION, POSITIVE_LABEL, RandomForestModel};
pub use train::{ForestOptions, MaxFeatures, TrainError, train_random_forest};
pub use tree::{DecisionTree, Node};
