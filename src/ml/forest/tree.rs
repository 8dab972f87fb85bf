use serde::{Deserialize, Serialize};

/// One node of a fitted decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Internal node: `feature <= threshold` goes left, everything else
    /// (including `NaN`) goes right.
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Terminal node holding the class distribution of its training samples.
    Leaf { distribution: Vec<f32> },
}

/// Binary decision tree stored as a flat node arena, root at index 0.
///
/// Children always sit at higher indices than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    /// Walk from the root to the leaf reached by `features`.
    ///
    /// Missing trailing features read as `NaN`.
    pub fn leaf_distribution(&self, features: &[f32]) -> &[f32] {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features
                        .get(*feature as usize)
                        .copied()
                        .unwrap_or(f32::NAN);
                    idx = (if value <= *threshold { *left } else { *right }) as usize;
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max_depth = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                let child_depth = depths[idx] + 1;
                for child in [*left, *right] {
                    if let Some(slot) = depths.get_mut(child as usize) {
                        *slot = child_depth;
                    }
                }
                max_depth = max_depth.max(child_depth);
            }
        }
        max_depth
    }

    /// Validate structural invariants of the tree.
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }
        let n_nodes = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature as usize >= n_features {
                        return Err(format!(
                            "Node {idx} splits on feature {feature} but model has {n_features}"
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("Node {idx} has a NaN threshold"));
                    }
                    for child in [*left, *right] {
                        let child = child as usize;
                        if child <= idx || child >= n_nodes {
                            return Err(format!("Node {idx} has invalid child index {child}"));
                        }
                    }
                }
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "Leaf {idx} has {} class probabilities but expected {n_classes}",
                            distribution.len()
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
