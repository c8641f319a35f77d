//! Trained booster: prediction, persistence, hashing and feature importance

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{GbdtError, Result};
use crate::matrix::DMatrix;
use crate::params::Objective;
use crate::tree::Tree;

/// Model format version written into serialized boosters
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// How feature importance is measured
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportanceType {
    /// Number of splits using the feature
    Split,
    /// Total loss reduction of splits using the feature
    Gain,
}

/// Additive ensemble of regression trees on top of a constant base score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booster {
    pub version: u32,
    pub objective: Objective,
    pub base_score: f64,
    pub num_features: usize,
    pub trees: Vec<Tree>,
}

impl Booster {
    pub fn new(objective: Objective, base_score: f64, num_features: usize, trees: Vec<Tree>) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            objective,
            base_score,
            num_features,
            trees,
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Keep only the first `n_trees` trees.
    pub fn truncate(&mut self, n_trees: usize) {
        self.trees.truncate(n_trees);
    }

    /// Prediction for a single row
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.predict_row(features))
    }

    /// Predict every row of `matrix`.
    pub fn predict(&self, matrix: &DMatrix) -> Result<Vec<f64>> {
        if matrix.n_cols() != self.num_features {
            return Err(GbdtError::FeatureMismatch {
                expected: self.num_features,
                actual: matrix.n_cols(),
            });
        }

        Ok((0..matrix.n_rows())
            .map(|row| self.predict_row(matrix.row(row)))
            .collect())
    }

    /// Per-feature importance, indexed by feature position.
    pub fn feature_importance(&self, kind: ImportanceType) -> Vec<f64> {
        let mut importance = vec![0.0; self.num_features];
        for node in self.trees.iter().flat_map(|tree| tree.nodes.iter()) {
            if node.is_leaf() || node.feature_idx < 0 {
                continue;
            }
            if let Some(slot) = importance.get_mut(node.feature_idx as usize) {
                *slot += match kind {
                    ImportanceType::Split => 1.0,
                    ImportanceType::Gain => node.gain,
                };
            }
        }
        importance
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// BLAKE3 hash of the compact JSON form, hex encoded.
    pub fn hash_hex(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
    }
}
