//! Tabular datasets: CSV loading and stratified train/test partitioning.

pub mod loader;
pub mod split;

use std::collections::BTreeMap;

/// Dense row-major `f32` feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_rows: usize,
    n_cols: usize,
    values: Vec<f32>,
}

impl FeatureMatrix {
    /// Create an empty matrix with a fixed column count.
    pub fn with_columns(n_cols: usize) -> Self {
        Self {
            n_rows: 0,
            n_cols,
            values: Vec::new(),
        }
    }

    /// Build a matrix from equal-length rows. Returns `None` on ragged input.
    pub fn from_rows(rows: &[Vec<f32>]) -> Option<Self> {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut matrix = Self::with_columns(n_cols);
        for row in rows {
            if row.len() != n_cols {
                return None;
            }
            matrix.push_row(row);
        }
        Some(matrix)
    }

    /// Append one row. The caller guarantees `row.len() == n_cols`.
    pub fn push_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.n_cols);
        self.values.extend_from_slice(row);
        self.n_rows += 1;
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.n_cols;
        &self.values[start..start + self.n_cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.n_cols + col]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.n_rows).map(move |idx| self.row(idx))
    }
}

/// In-memory dataset: named feature columns plus one integer label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature column names in file order, target excluded.
    pub feature_names: Vec<String>,
    /// Name of the column the labels came from.
    pub target: String,
    pub features: FeatureMatrix,
    /// Labels aligned with `features` rows.
    pub labels: Vec<i64>,
}

impl Dataset {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Count rows per label, ordered by label.
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    /// Relative frequency per label, ordered by label.
    pub fn label_distribution(&self) -> Vec<(i64, f64)> {
        let total = self.n_rows().max(1) as f64;
        self.class_counts()
            .into_iter()
            .map(|(label, count)| (label, count as f64 / total))
            .collect()
    }

    /// Copy the given rows (in the given order) into a new dataset.
    pub fn subset(&self, rows: &[usize]) -> Dataset {
        let mut features = FeatureMatrix::with_columns(self.features.n_cols());
        let mut labels = Vec::with_capacity(rows.len());
        for &idx in rows {
            features.push_row(self.features.row(idx));
            labels.push(self.labels[idx]);
        }
        Dataset {
            feature_names: self.feature_names.clone(),
            target: self.target.clone(),
            features,
            labels,
        }
    }
}
