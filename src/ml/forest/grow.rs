//! Depth-first CART growth with Gini impurity.
//!
//! A bootstrap draw becomes a per-row weight (how often the row was drawn).
//! Nodes hold distinct in-bag rows; class counts, impurity and leaf
//! distributions are weighted, while the size limits count distinct rows.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dataset::FeatureMatrix;

use super::tree::{DecisionTree, Node};

/// Read-only training inputs shared by every tree.
pub(crate) struct GrowContext<'a> {
    pub features: &'a FeatureMatrix,
    /// Class index per row.
    pub y: &'a [usize],
    pub n_classes: usize,
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub bootstrap: bool,
}

/// A fitted tree plus its unnormalized impurity decrease per feature.
pub(crate) struct GrownTree {
    pub tree: DecisionTree,
    pub importances: Vec<f64>,
}

struct PendingNode {
    node: usize,
    start: usize,
    end: usize,
    depth: usize,
}

#[derive(Debug, Clone)]
struct BestSplit {
    feature: usize,
    threshold: f32,
    /// Distinct rows sent left.
    n_left: usize,
    /// `sum(left_w^2) / w_left + sum(right_w^2) / w_right`; larger is purer.
    proxy: f64,
    left_counts: Vec<f64>,
}

/// Grow one tree from its own seed.
///
/// The seed drives both the bootstrap draw and the per-node feature order,
/// so the same seed always produces the same tree.
pub(crate) fn grow_tree(ctx: &GrowContext<'_>, seed: u64) -> GrownTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_features = ctx.features.n_cols();

    let weights = sample_weights(ctx, &mut rng);
    let mut samples: Vec<usize> = (0..weights.len()).filter(|&row| weights[row] > 0).collect();
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let mut scratch: Vec<(f32, usize)> = Vec::with_capacity(samples.len());
    let mut importances = vec![0.0f64; n_features];

    let mut nodes = vec![placeholder()];
    let mut stack = vec![PendingNode {
        node: 0,
        start: 0,
        end: samples.len(),
        depth: 0,
    }];

    while let Some(pending) = stack.pop() {
        let slice = &mut samples[pending.start..pending.end];
        let n_node = slice.len();
        let counts = class_counts(slice, ctx.y, &weights, ctx.n_classes);
        let w_node: f64 = counts.iter().sum();
        let impurity = gini(&counts, w_node);

        let splittable = n_node >= ctx.min_samples_split
            && n_node >= 2 * ctx.min_samples_leaf
            && impurity > f64::EPSILON
            && ctx.max_depth.is_none_or(|max| pending.depth < max);
        let best = if splittable {
            find_best_split(
                ctx,
                slice,
                &weights,
                &counts,
                &mut feature_order,
                &mut scratch,
                &mut rng,
            )
        } else {
            None
        };

        let Some(best) = best else {
            nodes[pending.node] = leaf(&counts, w_node);
            continue;
        };

        let n_left = partition(slice, |row| {
            ctx.features.get(row, best.feature) <= best.threshold
        });
        debug_assert_eq!(n_left, best.n_left);
        let right_counts: Vec<f64> = counts
            .iter()
            .zip(&best.left_counts)
            .map(|(total, left)| total - left)
            .collect();
        let w_left: f64 = best.left_counts.iter().sum();
        let w_right = w_node - w_left;
        importances[best.feature] += w_node * impurity
            - w_left * gini(&best.left_counts, w_left)
            - w_right * gini(&right_counts, w_right);

        let left = nodes.len();
        nodes.push(placeholder());
        let right = nodes.len();
        nodes.push(placeholder());
        nodes[pending.node] = Node::Split {
            feature: best.feature as u32,
            threshold: best.threshold,
            left: left as u32,
            right: right as u32,
        };

        let mid = pending.start + n_left;
        stack.push(PendingNode {
            node: right,
            start: mid,
            end: pending.end,
            depth: pending.depth + 1,
        });
        stack.push(PendingNode {
            node: left,
            start: pending.start,
            end: mid,
            depth: pending.depth + 1,
        });
    }

    GrownTree {
        tree: DecisionTree { nodes },
        importances,
    }
}

/// How many times each row was drawn: `n` draws with replacement, or one
/// each without bootstrap.
fn sample_weights(ctx: &GrowContext<'_>, rng: &mut StdRng) -> Vec<u32> {
    let n = ctx.features.n_rows();
    if !ctx.bootstrap {
        return vec![1; n];
    }
    let mut weights = vec![0u32; n];
    for _ in 0..n {
        weights[rng.random_range(0..n)] += 1;
    }
    weights
}

fn find_best_split(
    ctx: &GrowContext<'_>,
    samples: &[usize],
    weights: &[u32],
    counts: &[f64],
    feature_order: &mut [usize],
    scratch: &mut Vec<(f32, usize)>,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let n_node = samples.len();
    let min_leaf = ctx.min_samples_leaf.max(1);
    let w_node: f64 = counts.iter().sum();
    let mut best: Option<BestSplit> = None;
    let mut left_counts = vec![0.0f64; ctx.n_classes];
    let mut visited = 0usize;

    feature_order.shuffle(rng);
    for &feature in feature_order.iter() {
        if visited >= ctx.max_features {
            break;
        }
        scratch.clear();
        scratch.extend(samples.iter().map(|&row| (ctx.features.get(row, feature), row)));
        scratch.sort_unstable_by_key(|(value, _)| OrderedFloat(*value));
        if OrderedFloat(scratch[0].0) == OrderedFloat(scratch[n_node - 1].0) {
            // Constant in this node; does not count towards max_features.
            continue;
        }
        visited += 1;

        left_counts.fill(0.0);
        let mut w_left = 0.0f64;
        for pos in 1..n_node {
            let row = scratch[pos - 1].1;
            let w = f64::from(weights[row]);
            left_counts[ctx.y[row]] += w;
            w_left += w;
            if pos < min_leaf || n_node - pos < min_leaf {
                continue;
            }
            let below = scratch[pos - 1].0;
            let above = scratch[pos].0;
            if OrderedFloat(below) == OrderedFloat(above) {
                continue;
            }
            let proxy = purity_proxy(&left_counts, counts, w_left, w_node - w_left);
            if best.as_ref().is_none_or(|b| proxy > b.proxy) {
                best = Some(BestSplit {
                    feature,
                    threshold: split_threshold(below, above),
                    n_left: pos,
                    proxy,
                    left_counts: left_counts.clone(),
                });
            }
        }
    }
    best
}

fn purity_proxy(left_counts: &[f64], counts: &[f64], w_left: f64, w_right: f64) -> f64 {
    let mut left_sq = 0.0f64;
    let mut right_sq = 0.0f64;
    for (&total, &left) in counts.iter().zip(left_counts) {
        let right = total - left;
        left_sq += left * left;
        right_sq += right * right;
    }
    left_sq / w_left + right_sq / w_right
}

/// Threshold between two consecutive sorted values, `below < above`.
///
/// Returns the midpoint when it separates them, otherwise `below`. `above`
/// may be `NaN` (missing values sort last).
fn split_threshold(below: f32, above: f32) -> f32 {
    let mid = below * 0.5 + above * 0.5;
    if mid.is_nan() || mid < below || mid >= above {
        below
    } else {
        mid
    }
}

fn partition(slice: &mut [usize], mut goes_left: impl FnMut(usize) -> bool) -> usize {
    let mut left_end = 0;
    for idx in 0..slice.len() {
        if goes_left(slice[idx]) {
            slice.swap(idx, left_end);
            left_end += 1;
        }
    }
    left_end
}

/// Weighted class totals over `samples`.
fn class_counts(samples: &[usize], y: &[usize], weights: &[u32], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0f64; n_classes];
    for &row in samples {
        counts[y[row]] += f64::from(weights[row]);
    }
    counts
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts
        .iter()
        .map(|&c| {
            let p = c / total;
            p * p
        })
        .sum();
    1.0 - sum_sq
}

fn leaf(counts: &[f64], total: f64) -> Node {
    let total = total.max(1.0);
    Node::Leaf {
        distribution: counts.iter().map(|&c| (c / total) as f32).collect(),
    }
}

fn placeholder() -> Node {
    Node::Leaf {
        distribution: Vec::new(),
    }
}
