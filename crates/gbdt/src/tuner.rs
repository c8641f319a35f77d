//! Stepwise hyperparameter search
//!
//! Tunes one parameter group at a time in a fixed order. Each stage trains
//! its candidates concurrently, keeps the best one if it beats the current
//! configuration, and hands the winning parameters to the next stage. Every
//! trial is an ordinary early-stopped fit, so the best trial's model is the
//! final model.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::errors::Result;
use crate::matrix::DMatrix;
use crate::params::BoosterParams;
use crate::trainer::{TrainOptions, TrainOutcome, Trainer};

/// Parameter groups in tuning order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    FeatureFraction,
    NumLeaves,
    Bagging,
    FeatureFractionFine,
    LambdaL2,
    MinChildSamples,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::FeatureFraction,
        Stage::NumLeaves,
        Stage::Bagging,
        Stage::FeatureFractionFine,
        Stage::LambdaL2,
        Stage::MinChildSamples,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::FeatureFraction => "feature_fraction",
            Stage::NumLeaves => "num_leaves",
            Stage::Bagging => "bagging",
            Stage::FeatureFractionFine => "feature_fraction_stage2",
            Stage::LambdaL2 => "regularization_factors",
            Stage::MinChildSamples => "min_child_samples",
        }
    }

    /// Candidate parameter sets derived from `current`. Candidates equal to
    /// `current` are left out since they have already been scored.
    pub fn candidates(&self, current: &BoosterParams) -> Vec<BoosterParams> {
        let all: Vec<BoosterParams> = match self {
            Stage::FeatureFraction => [0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
                .iter()
                .map(|&ff| tweak(current, |p| p.feature_fraction = ff))
                .collect(),
            Stage::NumLeaves => [4, 8, 16, 31, 48, 64, 96, 128]
                .iter()
                .map(|&leaves| tweak(current, |p| p.num_leaves = leaves))
                .collect(),
            Stage::Bagging => [(0.5, 1), (0.6, 1), (0.7, 1), (0.8, 1), (0.9, 1), (1.0, 0)]
                .iter()
                .map(|&(fraction, freq)| {
                    tweak(current, |p| {
                        p.bagging_fraction = fraction;
                        p.bagging_freq = freq;
                    })
                })
                .collect(),
            Stage::FeatureFractionFine => [-0.08, -0.04, 0.04, 0.08]
                .iter()
                .map(|delta| current.feature_fraction + delta)
                .filter(|ff| *ff > 0.0 && *ff <= 1.0)
                .map(|ff| tweak(current, |p| p.feature_fraction = ff))
                .collect(),
            Stage::LambdaL2 => [0.0, 1e-3, 1e-2, 1e-1, 1.0, 10.0]
                .iter()
                .map(|&l2| tweak(current, |p| p.lambda_l2 = l2))
                .collect(),
            Stage::MinChildSamples => [5, 10, 25, 50, 100]
                .iter()
                .map(|&mcs| tweak(current, |p| p.min_child_samples = mcs))
                .collect(),
        };

        all.into_iter().filter(|p| p != current).collect()
    }
}

fn tweak(current: &BoosterParams, f: impl FnOnce(&mut BoosterParams)) -> BoosterParams {
    let mut params = current.clone();
    f(&mut params);
    params
}

/// Best score reached after one stage
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage: Stage,
    pub trials: usize,
    pub best_score: f64,
}

/// Result of a full search
#[derive(Clone, Debug)]
pub struct TuneOutcome {
    /// Fit of the winning parameters
    pub best: TrainOutcome,
    pub params: BoosterParams,
    pub trials: usize,
    pub stages: Vec<StageResult>,
}

/// Stepwise tuner over [`Stage::ALL`]
#[derive(Clone, Debug)]
pub struct StepwiseTuner {
    base: BoosterParams,
    options: TrainOptions,
    stages: Vec<Stage>,
}

impl StepwiseTuner {
    pub fn new(base: BoosterParams, options: TrainOptions) -> Self {
        Self {
            base,
            options,
            stages: Stage::ALL.to_vec(),
        }
    }

    /// Restrict the search to the given stages, in the given order.
    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = stages;
        self
    }

    pub fn tune(&self, train: &DMatrix, valid: &DMatrix) -> Result<TuneOutcome> {
        self.base.validate()?;

        // trials run concurrently, keep their logs quiet
        let trial_options = TrainOptions {
            log_every: 0,
            ..self.options.clone()
        };

        let mut params = self.base.clone();
        let mut best = Trainer::new(params.clone(), trial_options.clone()).fit(train, valid)?;
        let mut trials = 1;
        let mut stages = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let candidates = stage.candidates(&params);
            let outcomes = candidates
                .par_iter()
                .map(|candidate| Trainer::new(candidate.clone(), trial_options.clone()).fit(train, valid))
                .collect::<Result<Vec<_>>>()?;
            trials += outcomes.len();

            // lowest score wins, earliest candidate on ties
            let winner = outcomes
                .into_iter()
                .zip(candidates)
                .reduce(|a, b| if b.0.best_score < a.0.best_score { b } else { a });

            if let Some((outcome, candidate)) = winner {
                if outcome.best_score < best.best_score {
                    best = outcome;
                    params = candidate;
                }
            }

            debug!(
                "Tuning stage {} done, best valid rmse {:.6}",
                stage.name(),
                best.best_score
            );
            stages.push(StageResult {
                stage: *stage,
                trials,
                best_score: best.best_score,
            });
        }

        info!(
            "Tuning finished after {} trials, best valid rmse {:.6} at iteration {}",
            trials,
            best.best_score,
            best.best_iteration + 1
        );

        Ok(TuneOutcome {
            best,
            params,
            trials,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize, offset: usize) -> DMatrix {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x = (i * 7 + offset) % 101;
                vec![x as f64, ((x * 3) % 11) as f64]
            })
            .collect();
        let labels = rows.iter().map(|r| r[0] * 0.5 + r[1]).collect();
        DMatrix::from_rows(&rows).unwrap().with_labels(labels).unwrap()
    }

    fn base() -> BoosterParams {
        BoosterParams {
            learning_rate: 0.2,
            min_child_samples: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_candidates_skip_current() {
        let current = BoosterParams::default();
        let candidates = Stage::FeatureFraction.candidates(&current);
        assert_eq!(candidates.len(), 6);
        assert!(candidates.iter().all(|c| c.feature_fraction != 1.0));
    }

    #[test]
    fn test_fine_stage_stays_in_range() {
        let current = BoosterParams {
            feature_fraction: 0.95,
            ..Default::default()
        };
        let candidates = Stage::FeatureFractionFine.candidates(&current);
        assert!(candidates
            .iter()
            .all(|c| c.feature_fraction > 0.0 && c.feature_fraction <= 1.0));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_tuning_never_worse_than_base() {
        let train = data(150, 0);
        let valid = data(40, 3);
        let options = TrainOptions {
            num_boost_round: 20,
            early_stopping_rounds: 5,
            log_every: 0,
        };

        let baseline = Trainer::new(base(), options.clone()).fit(&train, &valid).unwrap();
        let tuned = StepwiseTuner::new(base(), options)
            .with_stages(vec![Stage::NumLeaves, Stage::MinChildSamples])
            .tune(&train, &valid)
            .unwrap();

        assert!(tuned.best.best_score <= baseline.best_score);
        assert_eq!(tuned.stages.len(), 2);
        assert!(tuned.trials > 1);
    }

    #[test]
    fn test_tuning_is_deterministic() {
        let train = data(120, 0);
        let valid = data(30, 5);
        let options = TrainOptions {
            num_boost_round: 15,
            early_stopping_rounds: 3,
            log_every: 0,
        };
        let tuner = StepwiseTuner::new(base(), options).with_stages(vec![Stage::Bagging]);

        let a = tuner.tune(&train, &valid).unwrap();
        let b = tuner.tune(&train, &valid).unwrap();
        assert_eq!(a.params, b.params);
        assert_eq!(a.best.best_score, b.best.best_score);
        assert_eq!(a.best.booster, b.best.booster);
    }
}
