//! Gradient boosting loop
//!
//! Fits squared-error regression trees one round at a time, scoring a
//! validation set after every round and stopping early once the
//! validation RMSE stalls.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::binning::BinnedMatrix;
use crate::booster::Booster;
use crate::early_stopping::EarlyStopping;
use crate::errors::{GbdtError, Result};
use crate::grower::{GrowerConfig, LeafWiseGrower};
use crate::matrix::DMatrix;
use crate::metric::rmse;
use crate::params::BoosterParams;

/// Boosting loop controls
#[derive(Clone, Debug, PartialEq)]
pub struct TrainOptions {
    /// Ceiling on boosting rounds
    pub num_boost_round: usize,
    /// Stop after this many rounds without validation improvement, 0 disables
    pub early_stopping_rounds: usize,
    /// Log train/valid RMSE every `log_every` rounds, 0 disables
    pub log_every: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            num_boost_round: 100,
            early_stopping_rounds: 0,
            log_every: 0,
        }
    }
}

/// Per-round RMSE on the training and validation sets
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalHistory {
    pub train_rmse: Vec<f64>,
    pub valid_rmse: Vec<f64>,
}

impl EvalHistory {
    pub fn rounds(&self) -> usize {
        self.valid_rmse.len()
    }
}

/// Result of a single fit
#[derive(Clone, Debug)]
pub struct TrainOutcome {
    /// Model truncated to the best iteration
    pub booster: Booster,
    /// Zero-based round with the lowest validation RMSE
    pub best_iteration: usize,
    /// Validation RMSE at `best_iteration`
    pub best_score: f64,
    /// Training RMSE at `best_iteration`
    pub best_train_score: f64,
    pub stopped_early: bool,
    pub history: EvalHistory,
}

/// GBDT trainer
#[derive(Clone, Debug)]
pub struct Trainer {
    params: BoosterParams,
    options: TrainOptions,
}

impl Trainer {
    pub fn new(params: BoosterParams, options: TrainOptions) -> Self {
        Self { params, options }
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn options(&self) -> &TrainOptions {
        &self.options
    }

    /// Fit on `train`, early-stopping on `valid`. Both need labels.
    pub fn fit(&self, train: &DMatrix, valid: &DMatrix) -> Result<TrainOutcome> {
        self.params.validate()?;
        if self.options.num_boost_round == 0 {
            return Err(GbdtError::InvalidParameter {
                name: "num_boost_round",
                reason: "must be at least 1".to_string(),
            });
        }

        let train_labels = train.require_labels("training")?;
        let valid_labels = valid.require_labels("validation")?;
        if train.is_empty() {
            return Err(GbdtError::InvalidData("training set is empty".to_string()));
        }
        if valid.is_empty() {
            return Err(GbdtError::InvalidData("validation set is empty".to_string()));
        }
        if valid.n_cols() != train.n_cols() {
            return Err(GbdtError::FeatureMismatch {
                expected: train.n_cols(),
                actual: valid.n_cols(),
            });
        }

        let n_rows = train.n_rows();
        let n_features = train.n_cols();
        let binned = BinnedMatrix::from_matrix(train, self.params.max_bin);

        let base_score = train_labels.iter().sum::<f64>() / n_rows as f64;
        let mut train_pred = vec![base_score; n_rows];
        let mut valid_pred = vec![base_score; valid.n_rows()];
        let hessians = vec![1.0; n_rows];
        let mut gradients = vec![0.0; n_rows];

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut bag: Vec<usize> = (0..n_rows).collect();
        let bagging = self.params.bagging_freq > 0 && self.params.bagging_fraction < 1.0;

        let mut early_stopping = EarlyStopping::new(self.options.early_stopping_rounds);
        let mut history = EvalHistory::default();
        let mut trees = Vec::with_capacity(self.options.num_boost_round);
        let mut stopped_early = false;

        for round in 0..self.options.num_boost_round {
            // squared error: gradient = prediction - target, hessian = 1
            for ((g, p), y) in gradients.iter_mut().zip(&train_pred).zip(train_labels) {
                *g = p - y;
            }

            if bagging && round % self.params.bagging_freq == 0 {
                bag = sample_sorted(&mut rng, n_rows, self.params.bagging_fraction);
            }
            let features = if self.params.feature_fraction < 1.0 {
                sample_sorted(&mut rng, n_features, self.params.feature_fraction)
            } else {
                (0..n_features).collect()
            };

            let grower = LeafWiseGrower::new(&binned, &gradients, &hessians, self.grower_config())?;
            let tree = grower.grow(bag.clone(), &features);

            for (row, pred) in train_pred.iter_mut().enumerate() {
                *pred += tree.predict_row(train.row(row));
            }
            for (row, pred) in valid_pred.iter_mut().enumerate() {
                *pred += tree.predict_row(valid.row(row));
            }
            trees.push(tree);

            let train_score = rmse(&train_pred, train_labels);
            let valid_score = rmse(&valid_pred, valid_labels);
            history.train_rmse.push(train_score);
            history.valid_rmse.push(valid_score);

            if self.options.log_every > 0 && (round + 1) % self.options.log_every == 0 {
                info!(
                    "[{}]\ttraining's rmse: {:.6}\tvalid's rmse: {:.6}",
                    round + 1,
                    train_score,
                    valid_score
                );
            }

            if early_stopping.should_stop(valid_score) {
                stopped_early = true;
                break;
            }
        }

        let best_iteration = if self.options.early_stopping_rounds > 0 {
            early_stopping.best_round()
        } else {
            history.rounds() - 1
        };

        if stopped_early {
            info!(
                "Early stopping, best iteration is: [{}]\tvalid's rmse: {:.6}",
                best_iteration + 1,
                history.valid_rmse[best_iteration]
            );
        } else {
            debug!("Finished {} boosting rounds", history.rounds());
        }

        let mut booster = Booster::new(self.params.objective, base_score, n_features, trees);
        booster.truncate(best_iteration + 1);

        Ok(TrainOutcome {
            booster,
            best_iteration,
            best_score: history.valid_rmse[best_iteration],
            best_train_score: history.train_rmse[best_iteration],
            stopped_early,
            history,
        })
    }

    fn grower_config(&self) -> GrowerConfig {
        GrowerConfig {
            num_leaves: self.params.num_leaves,
            max_depth: self.params.max_depth,
            min_child_samples: self.params.min_child_samples,
            min_sum_hessian: self.params.min_sum_hessian,
            lambda_l2: self.params.lambda_l2,
            min_gain_to_split: self.params.min_gain_to_split,
            learning_rate: self.params.learning_rate,
        }
    }
}

/// Sorted random subset of `0..n` with `fraction * n` elements (at least one).
fn sample_sorted(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n.max(1));
    let mut picked = index::sample(rng, n, amount.min(n)).into_vec();
    picked.sort_unstable();
    picked
}
