//! Evaluation metrics for classification models.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Mismatched lengths: {truth} labels, {other} predictions")]
    LengthMismatch { truth: usize, other: usize },
    #[error("No samples to evaluate")]
    Empty,
    #[error("ROC AUC is undefined when only one class is present (label {0})")]
    SingleClass(i64),
}

#[derive(Debug, Clone, PartialEq)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Class labels, ascending; row/column `i` refers to `classes[i]`.
    pub classes: Vec<i64>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty matrix over the given labels (sorted and deduplicated).
    pub fn new(mut classes: Vec<i64>) -> Self {
        classes.sort_unstable();
        classes.dedup();
        let k = classes.len();
        Self {
            classes,
            counts: vec![0; k * k],
        }
    }

    /// Build a matrix over every label seen in either input.
    pub fn from_labels(truth: &[i64], predicted: &[i64]) -> Self {
        let classes = truth.iter().chain(predicted).copied().collect();
        let mut cm = Self::new(classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Record one prediction. Labels outside the matrix are ignored.
    pub fn add(&mut self, truth: i64, predicted: i64) {
        let (Some(t), Some(p)) = (self.index_of(truth), self.index_of(predicted)) else {
            return;
        };
        let idx = t * self.n_classes() + p;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    /// Count by class index.
    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes() + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    fn index_of(&self, label: i64) -> Option<usize> {
        self.classes.binary_search(&label).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Precision/recall/F1 statistics for a single class.
pub struct PerClassStats {
    pub label: i64,
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
///
/// Zero denominators yield 0.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes();
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = f64::from(cm.get(class_idx, class_idx));
        let mut fp = 0f64;
        let mut fn_ = 0f64;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += f64::from(v);
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += f64::from(cm.get(i, class_idx));
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.push(PerClassStats {
            label: cm.classes[class_idx],
            precision,
            recall,
            f1,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let correct: u64 = (0..cm.n_classes())
        .map(|idx| u64::from(cm.get(idx, idx)))
        .sum();
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Area under the ROC curve for `positive` against every other label.
///
/// Computed as the Mann-Whitney U statistic with average ranks for tied
/// scores, i.e. the probability that a random positive outscores a random
/// negative, ties counting one half.
pub fn roc_auc(truth: &[i64], scores: &[f64], positive: i64) -> Result<f64, MetricsError> {
    if truth.len() != scores.len() {
        return Err(MetricsError::LengthMismatch {
            truth: truth.len(),
            other: scores.len(),
        });
    }
    if truth.is_empty() {
        return Err(MetricsError::Empty);
    }
    let n_pos = truth.iter().filter(|&&label| label == positive).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(MetricsError::SingleClass(truth[0]));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0f64;
    let mut start = 0usize;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied block [start, end) shares the mean rank.
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let tied_pos = order[start..end]
            .iter()
            .filter(|&&idx| truth[idx] == positive)
            .count();
        pos_rank_sum += mean_rank * tied_pos as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Averaged precision/recall/F1 over classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedStats {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Per-class precision/recall/F1 table with accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<PerClassStats>,
    pub accuracy: f64,
    pub macro_avg: AveragedStats,
    pub weighted_avg: AveragedStats,
    /// Decimal places used when rendering.
    #[serde(skip, default = "default_digits")]
    pub digits: usize,
}

fn default_digits() -> usize {
    2
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let per_class = precision_recall_by_class(cm);
        let total: u64 = per_class.iter().map(|s| u64::from(s.support)).sum();
        let k = per_class.len().max(1) as f64;
        let macro_avg = AveragedStats {
            precision: per_class.iter().map(|s| s.precision).sum::<f64>() / k,
            recall: per_class.iter().map(|s| s.recall).sum::<f64>() / k,
            f1: per_class.iter().map(|s| s.f1).sum::<f64>() / k,
            support: total,
        };
        let weight = |s: &PerClassStats| f64::from(s.support) / total.max(1) as f64;
        let weighted_avg = AveragedStats {
            precision: per_class.iter().map(|s| s.precision * weight(s)).sum(),
            recall: per_class.iter().map(|s| s.recall * weight(s)).sum(),
            f1: per_class.iter().map(|s| s.f1 * weight(s)).sum(),
            support: total,
        };
        Self {
            per_class,
            accuracy: accuracy(cm),
            macro_avg,
            weighted_avg,
            digits: default_digits(),
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WEIGHTED: &str = "weighted avg";
        let d = self.digits;
        let labels: Vec<String> = self.per_class.iter().map(|s| s.label.to_string()).collect();
        let w = labels
            .iter()
            .map(String::len)
            .chain([WEIGHTED.len(), d])
            .max()
            .unwrap_or(WEIGHTED.len());

        writeln!(
            f,
            "{:>w$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, s) in labels.iter().zip(&self.per_class) {
            writeln!(
                f,
                "{label:>w$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
                s.precision, s.recall, s.f1, s.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>w$}  {:>9} {:>9} {:>9.d$} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), (WEIGHTED, &self.weighted_avg)] {
            writeln!(
                f,
                "{name:>w$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
                avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}
