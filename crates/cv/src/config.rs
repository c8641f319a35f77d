//! Run configuration
//!
//! Every field has a default, so an empty TOML file (or none at all) gives
//! the standard run: 4 shuffled folds with seed 22, up to 2000 boosting
//! rounds with 100 rounds of early-stopping patience, and a stepwise search
//! before each fold's final fit.

use serde::{Deserialize, Serialize};
use shiptime_gbdt::{BoosterParams, TrainOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{PipelineError, Result};

pub const N_FOLDS: usize = 4;
pub const SEED: u64 = 22;
pub const NUM_BOOST_ROUND: usize = 2000;
pub const EARLY_STOPPING_ROUNDS: usize = 100;
pub const LOG_EVERY: usize = 500;
pub const LEARNING_RATE: f64 = 0.01;

/// Full run configuration
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunConfig {
    pub data: DataConfig,
    pub cv: CvConfig,
    pub training: TrainingConfig,
    /// Parameters for a plain fit (tuning off)
    pub params: BoosterParams,
    /// Starting point of the search (tuning on)
    pub tuned_params: BoosterParams,
    pub tracking: TrackingConfig,
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Combined train+test table
    pub dataset: PathBuf,
    /// Submission template, used for row framing only
    pub template: PathBuf,
    pub output_dir: PathBuf,
    pub train_flag_column: String,
    pub target_column: String,
}

/// Fold splitting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CvConfig {
    pub n_folds: usize,
    pub shuffle: bool,
    pub seed: u64,
}

/// Boosting loop and search switch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub num_boost_round: usize,
    pub early_stopping_rounds: usize,
    pub log_every: usize,
    /// Run the stepwise search before each fold's final fit
    pub tune: bool,
}

/// Experiment tracker location: a directory path or an `http(s)://` server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    pub uri: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/train_test.csv"),
            template: PathBuf::from("data/submission_2.csv"),
            output_dir: PathBuf::from("outputs"),
            train_flag_column: "train".to_string(),
            target_column: "shipping_time".to_string(),
        }
    }
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_folds: N_FOLDS,
            shuffle: true,
            seed: SEED,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_boost_round: NUM_BOOST_ROUND,
            early_stopping_rounds: EARLY_STOPPING_ROUNDS,
            log_every: LOG_EVERY,
            tune: true,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            uri: "mlruns".to_string(),
        }
    }
}

/// Parameters for a plain fit
pub fn default_params() -> BoosterParams {
    BoosterParams {
        learning_rate: LEARNING_RATE,
        feature_fraction: 0.7,
        max_depth: Some(7),
        num_leaves: 31,
        max_bin: 31,
        bagging_freq: 0,
        min_child_samples: 20,
        seed: SEED,
        ..Default::default()
    }
}

/// Search starting point: library defaults apart from learning rate and seed
pub fn default_tuned_params() -> BoosterParams {
    BoosterParams {
        learning_rate: LEARNING_RATE,
        seed: SEED,
        ..Default::default()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            cv: CvConfig::default(),
            training: TrainingConfig::default(),
            params: default_params(),
            tuned_params: default_tuned_params(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Configuration with all defaults applied
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; omitted sections and fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            data: DataConfig,
            #[serde(default)]
            cv: CvConfig,
            #[serde(default)]
            training: TrainingConfig,
            params: Option<toml::Value>,
            tuned_params: Option<toml::Value>,
            #[serde(default)]
            tracking: TrackingConfig,
        }

        let raw: Raw = toml::from_str(content)?;

        Ok(Self {
            data: raw.data,
            cv: raw.cv,
            training: raw.training,
            params: overlay_params(default_params(), raw.params)?,
            tuned_params: overlay_params(default_tuned_params(), raw.tuned_params)?,
            tracking: raw.tracking,
        })
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("failed to read {}: {}", path.display(), err))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Use one seed for fold shuffling and both parameter sets.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.cv.seed = seed;
        self.params.seed = seed;
        self.tuned_params.seed = seed;
        self
    }

    /// Parameters for the configured mode
    pub fn active_params(&self) -> &BoosterParams {
        if self.training.tune {
            &self.tuned_params
        } else {
            &self.params
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            num_boost_round: self.training.num_boost_round,
            early_stopping_rounds: self.training.early_stopping_rounds,
            log_every: self.training.log_every,
        }
    }

    /// Prefix for run names, marks searched runs
    pub fn run_name_prefix(&self) -> &'static str {
        if self.training.tune {
            "tuned_"
        } else {
            ""
        }
    }

    /// Reject unusable settings and return warnings for questionable ones.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.cv.n_folds < 2 {
            return Err(PipelineError::Config(format!(
                "n_folds must be at least 2, got {}",
                self.cv.n_folds
            )));
        }
        if self.training.num_boost_round == 0 {
            return Err(PipelineError::Config(
                "num_boost_round must be at least 1".to_string(),
            ));
        }
        if self.data.train_flag_column == self.data.target_column {
            return Err(PipelineError::Config(
                "train flag and target must be different columns".to_string(),
            ));
        }
        self.active_params().validate()?;

        let mut warnings = Vec::new();
        if self.training.early_stopping_rounds == 0 {
            warnings.push("Early stopping disabled, every boosting round is kept".to_string());
        } else if self.training.early_stopping_rounds >= self.training.num_boost_round {
            warnings.push(format!(
                "early_stopping_rounds ({}) is not below num_boost_round ({})",
                self.training.early_stopping_rounds, self.training.num_boost_round
            ));
        }
        if !self.cv.shuffle {
            warnings.push("Folds are not shuffled, rows are split in file order".to_string());
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }
}

/// Apply the fields present in `value` on top of `base`.
fn overlay_params(base: BoosterParams, value: Option<toml::Value>) -> Result<BoosterParams> {
    let Some(toml::Value::Table(overrides)) = value else {
        return Ok(base);
    };

    let mut merged = serde_json::to_value(&base)?;
    if let serde_json::Value::Object(map) = &mut merged {
        for (key, value) in overrides {
            map.insert(key, serde_json::to_value(value)?);
        }
    }
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = RunConfig::new();
        assert_eq!(config.cv.n_folds, 4);
        assert_eq!(config.cv.seed, 22);
        assert!(config.cv.shuffle);
        assert_eq!(config.training.num_boost_round, 2000);
        assert_eq!(config.training.early_stopping_rounds, 100);
        assert_eq!(config.training.log_every, 500);
        assert!(config.training.tune);
        assert_eq!(config.params.learning_rate, 0.01);
        assert_eq!(config.params.max_bin, 31);
        assert_eq!(config.params.max_depth, Some(7));
        assert_eq!(config.tuned_params.max_bin, 255);
        assert_eq!(config.data.target_column, "shipping_time");
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(RunConfig::from_toml_str("").unwrap(), RunConfig::new());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = RunConfig::from_toml_str(
            r#"
            [cv]
            n_folds = 5

            [training]
            tune = false

            [params]
            num_leaves = 63
            max_depth = 9

            [tracking]
            uri = "http://localhost:5000"
            "#,
        )
        .unwrap();

        assert_eq!(config.cv.n_folds, 5);
        assert_eq!(config.cv.seed, 22);
        assert!(!config.training.tune);
        assert_eq!(config.params.num_leaves, 63);
        assert_eq!(config.params.max_depth, Some(9));
        // untouched fields keep the plain-fit defaults
        assert_eq!(config.params.max_bin, 31);
        assert_eq!(config.params.feature_fraction, 0.7);
        assert_eq!(config.tracking.uri, "http://localhost:5000");
    }

    #[test]
    fn test_with_seed_applies_everywhere() {
        let config = RunConfig::new().with_seed(7);
        assert_eq!(config.cv.seed, 7);
        assert_eq!(config.params.seed, 7);
        assert_eq!(config.tuned_params.seed, 7);
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        let mut config = RunConfig::new();
        config.cv.n_folds = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_without_early_stopping() {
        let mut config = RunConfig::new();
        config.training.early_stopping_rounds = 0;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_active_params_follow_tune_flag() {
        let mut config = RunConfig::new();
        assert_eq!(config.active_params(), &config.tuned_params);
        assert_eq!(config.run_name_prefix(), "tuned_");
        config.training.tune = false;
        assert_eq!(config.active_params(), &config.params);
        assert_eq!(config.run_name_prefix(), "");
    }

    #[test]
    fn test_misspelled_param_rejected() {
        let result = RunConfig::from_toml_str(
            r#"
            [params]
            num_leave = 63
            "#,
        );
        assert!(matches!(result, Err(PipelineError::Json(_))));

        let result = RunConfig::from_toml_str("[tuned_params]\nlearning_rte = 0.1\n");
        assert!(result.is_err());
    }
}
