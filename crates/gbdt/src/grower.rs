//! Leaf-wise regression tree growth
//!
//! Grows one tree from per-row gradients and hessians using histogram split
//! search over binned features. The leaf with the largest gain is split
//! first until the leaf budget is spent or no split qualifies.

use crate::binning::BinnedMatrix;
use crate::errors::{GbdtError, Result};
use crate::tree::{Node, Tree};

/// Gains at or below this are treated as no improvement.
const K_EPSILON: f64 = 1e-15;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct GrowerConfig {
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub min_sum_hessian: f64,
    pub lambda_l2: f64,
    pub min_gain_to_split: f64,
    pub learning_rate: f64,
}

impl Default for GrowerConfig {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_sum_hessian: 1e-3,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
            learning_rate: 0.1,
        }
    }
}

/// Best split found for a leaf
#[derive(Clone, Copy, Debug)]
struct SplitCandidate {
    feature: usize,
    bin: u16,
    gain: f64,
}

/// A leaf that may still be split
struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitCandidate>,
}

#[derive(Clone, Copy, Default)]
struct HistBin {
    grad: f64,
    hess: f64,
    count: usize,
}

/// Grows regression trees over a binned training matrix
pub struct LeafWiseGrower<'a> {
    config: GrowerConfig,
    binned: &'a BinnedMatrix,
    gradients: &'a [f64],
    hessians: &'a [f64],
}

impl<'a> LeafWiseGrower<'a> {
    /// Gradients and hessians must hold one entry per binned row.
    pub fn new(
        binned: &'a BinnedMatrix,
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: GrowerConfig,
    ) -> Result<Self> {
        if gradients.len() != binned.n_rows() || hessians.len() != binned.n_rows() {
            return Err(GbdtError::InvalidData(format!(
                "got {} gradients and {} hessians for {} rows",
                gradients.len(),
                hessians.len(),
                binned.n_rows()
            )));
        }

        Ok(Self {
            config,
            binned,
            gradients,
            hessians,
        })
    }

    /// Build a tree from the given rows using only `features` as split candidates.
    pub fn grow(&self, rows: Vec<usize>, features: &[usize]) -> Tree {
        let mut nodes = vec![Node::leaf(self.leaf_value(&rows))];
        let root_split = self.find_best_split(&rows, 0, features);
        let mut open = vec![OpenLeaf {
            node: 0,
            rows,
            depth: 0,
            split: root_split,
        }];
        let mut n_leaves = 1;

        while n_leaves < self.config.num_leaves {
            // highest gain first, lowest node id on ties
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.map(|s| (i, leaf.node, s.gain)))
                .max_by(|a, b| a.2.total_cmp(&b.2).then(b.1.cmp(&a.1)));

            let Some((open_idx, _, _)) = best else {
                break;
            };

            let leaf = open.swap_remove(open_idx);
            let Some(split) = leaf.split else {
                break;
            };

            let column = self.binned.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                leaf.rows.iter().partition(|&&row| column[row] <= split.bin);

            let left_node = nodes.len();
            let right_node = left_node + 1;
            nodes[leaf.node] = Node::internal(
                split.feature as i32,
                self.binned.mapper(split.feature).threshold(split.bin),
                split.gain,
                left_node as i32,
                right_node as i32,
            );
            nodes.push(Node::leaf(self.leaf_value(&left_rows)));
            nodes.push(Node::leaf(self.leaf_value(&right_rows)));
            n_leaves += 1;

            let depth = leaf.depth + 1;
            for (node, child_rows) in [(left_node, left_rows), (right_node, right_rows)] {
                let split = self.find_best_split(&child_rows, depth, features);
                open.push(OpenLeaf {
                    node,
                    rows: child_rows,
                    depth,
                    split,
                });
            }
        }

        Tree::new(nodes)
    }

    /// Histogram split search. Features and bins are scanned in ascending
    /// order and only a strictly larger gain replaces the current best, so
    /// ties resolve to the lowest (feature, bin).
    fn find_best_split(
        &self,
        rows: &[usize],
        depth: usize,
        features: &[usize],
    ) -> Option<SplitCandidate> {
        if self.config.max_depth.is_some_and(|max| depth >= max)
            || rows.len() < 2 * self.config.min_child_samples
        {
            return None;
        }

        let (sum_g, sum_h) = self.sum_gradients_hessians(rows);
        let parent_score = self.leaf_score(sum_g, sum_h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let n_bins = self.binned.mapper(feature).n_bins();
            if n_bins < 2 {
                continue;
            }

            let column = self.binned.column(feature);
            let mut hist = vec![HistBin::default(); n_bins];
            for &row in rows {
                let bin = &mut hist[column[row] as usize];
                bin.grad += self.gradients[row];
                bin.hess += self.hessians[row];
                bin.count += 1;
            }

            let mut left = HistBin::default();
            for (bin_idx, bin) in hist.iter().enumerate().take(n_bins - 1) {
                left.grad += bin.grad;
                left.hess += bin.hess;
                left.count += bin.count;

                let right_count = rows.len() - left.count;
                if left.count < self.config.min_child_samples {
                    continue;
                }
                if right_count < self.config.min_child_samples {
                    break;
                }

                let right_grad = sum_g - left.grad;
                let right_hess = sum_h - left.hess;
                if left.hess < self.config.min_sum_hessian || right_hess < self.config.min_sum_hessian {
                    continue;
                }

                let gain = self.leaf_score(left.grad, left.hess)
                    + self.leaf_score(right_grad, right_hess)
                    - parent_score;

                if gain <= self.config.min_gain_to_split + K_EPSILON {
                    continue;
                }

                if best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin: bin_idx as u16,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn sum_gradients_hessians(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &row| {
            (g + self.gradients[row], h + self.hessians[row])
        })
    }

    fn leaf_score(&self, grad: f64, hess: f64) -> f64 {
        grad * grad / (hess + self.config.lambda_l2)
    }

    /// Shrunk leaf output: -G / (H + lambda) * learning_rate
    fn leaf_value(&self, rows: &[usize]) -> f64 {
        let (sum_g, sum_h) = self.sum_gradients_hessians(rows);
        let denom = sum_h + self.config.lambda_l2;
        if denom <= 0.0 {
            return 0.0;
        }
        -sum_g / denom * self.config.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DMatrix;

    fn step_data() -> (BinnedMatrix, Vec<f64>, Vec<f64>) {
        // target jumps from 0 to 10 at x = 50; gradients at prediction 5
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
        let matrix = DMatrix::from_rows(&rows).unwrap();
        let binned = BinnedMatrix::from_matrix(&matrix, 255);
        let gradients = (0..100).map(|i| if i < 50 { 5.0 } else { -5.0 }).collect();
        let hessians = vec![1.0; 100];
        (binned, gradients, hessians)
    }

    #[test]
    fn test_finds_step_split() {
        let (binned, gradients, hessians) = step_data();
        let config = GrowerConfig {
            num_leaves: 2,
            min_child_samples: 5,
            learning_rate: 1.0,
            ..Default::default()
        };
        let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, config).unwrap();
        let tree = grower.grow((0..100).collect(), &[0]);

        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].feature_idx, 0);
        assert!(tree.nodes[0].threshold > 49.0 && tree.nodes[0].threshold < 50.0);
        assert_eq!(tree.predict_row(&[10.0]), -5.0);
        assert_eq!(tree.predict_row(&[90.0]), 5.0);
    }

    #[test]
    fn test_leaf_budget_respected() {
        let (binned, _, hessians) = step_data();
        let gradients: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let config = GrowerConfig {
            num_leaves: 4,
            min_child_samples: 1,
            ..Default::default()
        };
        let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, config).unwrap();
        let tree = grower.grow((0..100).collect(), &[0]);
        assert!(tree.num_leaves() <= 4);
    }

    #[test]
    fn test_max_depth_respected() {
        let (binned, _, hessians) = step_data();
        let gradients: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let config = GrowerConfig {
            num_leaves: 64,
            max_depth: Some(2),
            min_child_samples: 1,
            ..Default::default()
        };
        let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, config).unwrap();
        let tree = grower.grow((0..100).collect(), &[0]);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_min_child_samples_blocks_split() {
        let (binned, gradients, hessians) = step_data();
        let config = GrowerConfig {
            min_child_samples: 60,
            ..Default::default()
        };
        let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, config).unwrap();
        let tree = grower.grow((0..100).collect(), &[0]);
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_no_features_gives_leaf() {
        let (binned, gradients, hessians) = step_data();
        let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, GrowerConfig::default()).unwrap();
        let tree = grower.grow((0..100).collect(), &[]);
        assert_eq!(tree.nodes.len(), 1);
        assert!(tree.nodes[0].is_leaf());
    }

    #[test]
    fn test_rejects_gradient_length_mismatch() {
        let (binned, gradients, hessians) = step_data();
        let short = &gradients[..99];
        let result = LeafWiseGrower::new(&binned, short, &hessians, GrowerConfig::default());
        assert!(matches!(result, Err(GbdtError::InvalidData(_))));

        let result = LeafWiseGrower::new(&binned, &gradients, &hessians[..10], GrowerConfig::default());
        assert!(result.is_err());
    }
}
