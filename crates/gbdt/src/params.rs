//! Booster hyperparameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{GbdtError, Result};

/// Loss optimized by the booster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Squared error
    #[default]
    Regression,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Regression => "regression",
        }
    }
}

/// Evaluation metric used for early stopping and reporting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Rmse,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Rmse => "rmse",
        }
    }
}

/// Tree and boosting hyperparameters.
///
/// Defaults follow the usual LightGBM defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoosterParams {
    pub objective: Objective,
    pub metric: Metric,
    pub learning_rate: f64,
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Maximum tree depth, unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum rows per leaf
    pub min_child_samples: usize,
    /// Minimum hessian sum per leaf
    pub min_sum_hessian: f64,
    /// L2 regularization on leaf values
    pub lambda_l2: f64,
    pub min_gain_to_split: f64,
    /// Fraction of columns sampled per tree
    pub feature_fraction: f64,
    /// Fraction of rows sampled when bagging is on
    pub bagging_fraction: f64,
    /// Resample rows every `bagging_freq` rounds, 0 disables bagging
    pub bagging_freq: usize,
    /// Maximum histogram bins per feature
    pub max_bin: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            objective: Objective::Regression,
            metric: Metric::Rmse,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_sum_hessian: 1e-3,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
            feature_fraction: 1.0,
            bagging_fraction: 1.0,
            bagging_freq: 0,
            max_bin: 255,
            seed: 0,
        }
    }
}

impl BoosterParams {
    /// Check every parameter against its valid range.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", "must be positive"));
        }
        if self.num_leaves < 2 {
            return Err(invalid("num_leaves", "must be at least 2"));
        }
        if self.max_depth == Some(0) {
            return Err(invalid("max_depth", "must be at least 1 when set"));
        }
        if self.min_child_samples == 0 {
            return Err(invalid("min_child_samples", "must be at least 1"));
        }
        if self.lambda_l2 < 0.0 {
            return Err(invalid("lambda_l2", "must not be negative"));
        }
        if self.min_sum_hessian < 0.0 {
            return Err(invalid("min_sum_hessian", "must not be negative"));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(invalid("feature_fraction", "must be in (0, 1]"));
        }
        if !(self.bagging_fraction > 0.0 && self.bagging_fraction <= 1.0) {
            return Err(invalid("bagging_fraction", "must be in (0, 1]"));
        }
        if self.max_bin < 2 || self.max_bin > u16::MAX as usize {
            return Err(invalid("max_bin", "must be in [2, 65535]"));
        }
        Ok(())
    }

    /// Flat `name -> value` listing for experiment logs.
    pub fn to_param_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("objective".to_string(), self.objective.as_str().to_string());
        map.insert("metric".to_string(), self.metric.as_str().to_string());
        map.insert("learning_rate".to_string(), self.learning_rate.to_string());
        map.insert("num_leaves".to_string(), self.num_leaves.to_string());
        map.insert(
            "max_depth".to_string(),
            self.max_depth.map_or_else(|| "-1".to_string(), |d| d.to_string()),
        );
        map.insert("min_child_samples".to_string(), self.min_child_samples.to_string());
        map.insert("min_sum_hessian".to_string(), self.min_sum_hessian.to_string());
        map.insert("lambda_l2".to_string(), self.lambda_l2.to_string());
        map.insert("min_gain_to_split".to_string(), self.min_gain_to_split.to_string());
        map.insert("feature_fraction".to_string(), self.feature_fraction.to_string());
        map.insert("bagging_fraction".to_string(), self.bagging_fraction.to_string());
        map.insert("bagging_freq".to_string(), self.bagging_freq.to_string());
        map.insert("max_bin".to_string(), self.max_bin.to_string());
        map.insert("seed".to_string(), self.seed.to_string());
        map
    }
}

fn invalid(name: &'static str, reason: &str) -> GbdtError {
    GbdtError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(BoosterParams::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let params = BoosterParams {
            feature_fraction: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(GbdtError::InvalidParameter { name: "feature_fraction", .. })
        ));
    }

    #[test]
    fn test_rejects_single_leaf() {
        let params = BoosterParams {
            num_leaves: 1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_param_map_unlimited_depth() {
        let map = BoosterParams::default().to_param_map();
        assert_eq!(map["max_depth"], "-1");
        assert_eq!(map["objective"], "regression");
        assert_eq!(map["metric"], "rmse");
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let params: BoosterParams =
            serde_json::from_str(r#"{"learning_rate":0.01,"max_depth":7}"#).unwrap();
        assert_eq!(params.learning_rate, 0.01);
        assert_eq!(params.max_depth, Some(7));
        assert_eq!(params.num_leaves, 31);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = serde_json::from_str::<BoosterParams>(r#"{"num_leave":63}"#);
        assert!(result.is_err());
    }
}
