use serde::{Deserialize, Serialize};

use crate::dataset::FeatureMatrix;

use super::tree::DecisionTree;

/// Current model layout version.
pub const MODEL_VERSION: u32 = 1;

/// Label scored by ROC-AUC and [`RandomForestModel::positive_proba`].
pub const POSITIVE_LABEL: i64 = 1;

/// Random forest classifier: an unweighted average of decision trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    /// Model format version.
    pub model_version: u32,
    /// Feature column names, in the order rows must be supplied.
    pub feature_names: Vec<String>,
    /// Distinct class labels, ascending. Leaf distributions follow this order.
    pub classes: Vec<i64>,
    pub trees: Vec<DecisionTree>,
    /// Mean impurity decrease per feature, normalized to sum to 1.
    pub feature_importances: Vec<f32>,
}

impl RandomForestModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != MODEL_VERSION {
            return Err(format!(
                "Unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            ));
        }
        if self.classes.len() < 2 {
            return Err("Model must contain at least 2 classes".to_string());
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err("Model classes must be strictly ascending".to_string());
        }
        if self.trees.is_empty() {
            return Err("Model has no trees".to_string());
        }
        if self.feature_importances.len() != self.n_features() {
            return Err("feature_importances length must match feature_names length".to_string());
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features(), self.classes.len())
                .map_err(|err| format!("Tree {tree_idx}: {err}"))?;
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Label whose probability [`Self::positive_proba`] reports: `1` when the
    /// model knows it, otherwise the largest class.
    pub fn positive_class(&self) -> i64 {
        self.classes
            .get(self.positive_index())
            .copied()
            .unwrap_or(POSITIVE_LABEL)
    }

    fn positive_index(&self) -> usize {
        self.classes
            .binary_search(&POSITIVE_LABEL)
            .unwrap_or_else(|_| self.classes.len().saturating_sub(1))
    }

    /// Average the leaf class distributions over all trees.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f64> {
        let mut proba = vec![0.0f64; self.classes.len()];
        for tree in &self.trees {
            for (acc, &p) in proba.iter_mut().zip(tree.leaf_distribution(features)) {
                *acc += f64::from(p);
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        for p in &mut proba {
            *p /= n_trees;
        }
        proba
    }

    /// Probability of [`Self::positive_class`].
    pub fn positive_proba(&self, features: &[f32]) -> f64 {
        self.predict_proba(features)
            .get(self.positive_index())
            .copied()
            .unwrap_or(0.0)
    }

    /// Predict the most probable class index; the first class wins ties.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_proba(features))
    }

    /// Predict the most probable class label.
    pub fn predict(&self, features: &[f32]) -> i64 {
        self.classes[self.predict_class_index(features)]
    }

    /// Predicted labels and positive-class probabilities for every row.
    pub fn predict_matrix(&self, features: &FeatureMatrix) -> (Vec<i64>, Vec<f64>) {
        let positive = self.positive_index();
        features
            .rows()
            .map(|row| {
                let proba = self.predict_proba(row);
                let label = self.classes[argmax(&proba)];
                (label, proba.get(positive).copied().unwrap_or(0.0))
            })
            .unzip()
    }

    /// Features sorted by importance, highest first.
    pub fn ranked_features(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(self.feature_importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
