//! Regression tree nodes and traversal

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into the feature row
/// - rows with `value <= threshold` (or a missing value) go `left`
///
/// For leaf nodes:
/// - `feature_idx == -1`, `left == right == -1`
/// - `leaf` holds the output, already scaled by the learning rate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub left: i32,
    pub right: i32,
    pub feature_idx: i32,
    pub threshold: f64,
    /// Loss reduction of the split, 0 for leaves
    pub gain: f64,
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(feature_idx: i32, threshold: f64, gain: f64, left: i32, right: i32) -> Self {
        Self {
            left,
            right,
            feature_idx,
            threshold,
            gain,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            gain: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// A single regression tree; node 0 is the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Tree output for one feature row.
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if let Some(value) = node.leaf {
                return value;
            }

            let value = features
                .get(node.feature_idx as usize)
                .copied()
                .unwrap_or(f64::NAN);

            let next = if value.is_nan() || value <= node.threshold {
                node.left
            } else {
                node.right
            };

            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Depth of the deepest leaf, the root alone has depth 0.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize, depth: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => walk(nodes, node.left as usize, depth + 1)
                    .max(walk(nodes, node.right as usize, depth + 1)),
                _ => depth,
            }
        }
        walk(&self.nodes, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::internal(0, 5.0, 1.0, 1, 2),
            Node::leaf(-1.0),
            Node::leaf(1.0),
        ])
    }

    #[test]
    fn test_traversal() {
        let tree = stump();
        assert_eq!(tree.predict_row(&[4.0]), -1.0);
        assert_eq!(tree.predict_row(&[5.0]), -1.0);
        assert_eq!(tree.predict_row(&[6.0]), 1.0);
    }

    #[test]
    fn test_missing_routes_left() {
        assert_eq!(stump().predict_row(&[f64::NAN]), -1.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let tree = Tree::new(vec![Node::leaf(2.5)]);
        assert_eq!(tree.predict_row(&[]), 2.5);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_shape() {
        let tree = stump();
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.depth(), 1);
    }
}
