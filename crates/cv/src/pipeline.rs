//! K-fold training run
//!
//! Each fold trains on the other folds' rows, early-stops on its own rows and
//! predicts the whole test set. Test predictions and validation scores are
//! averaged over folds, the averaged predictions are written as a submission
//! file, and every fold plus the aggregate is recorded with the tracker.

use rand::Rng;
use serde::Serialize;
use shiptime_gbdt::{
    Booster, BoosterParams, DMatrix, ImportanceType, StepwiseTuner, TrainOutcome, Trainer,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregate::{PredictionAccumulator, ScoreAccumulator};
use crate::config::RunConfig;
use crate::dataset::{DatasetLoader, TrainTestSplit};
use crate::errors::Result;
use crate::export::export_submission;
use crate::folds::{Fold, KFold};
use crate::tracking::{with_run, MetricPoint, RunHandle, Tracker};

/// Experiment holding the fold-averaged results
pub const AGGREGATE_EXPERIMENT: &str = "all";

/// Run ids are drawn from `0..RUN_ID_RANGE`
pub const RUN_ID_RANGE: u32 = 1_000_000;

/// Result of one fold
#[derive(Clone, Debug)]
pub struct FoldReport {
    /// One-based fold number
    pub fold: usize,
    /// Validation RMSE at the best iteration
    pub best_score: f64,
    /// One-based best boosting round
    pub best_iteration: usize,
    /// Rounds actually trained
    pub rounds: usize,
    pub params: BoosterParams,
    pub model_hash: String,
}

/// Result of a full run
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_id: u32,
    pub run_name: String,
    pub folds: Vec<FoldReport>,
    /// Mean of the fold validation RMSEs
    pub score: f64,
    pub submission: PathBuf,
    pub n_predictions: usize,
}

impl RunSummary {
    /// `exp(-score) * 10000`
    pub fn leaderboard_score(&self) -> f64 {
        leaderboard_score(self.score)
    }
}

#[derive(Serialize)]
struct FeatureImportance<'a> {
    feature: &'a str,
    split: f64,
    gain: f64,
}

/// Run with a freshly drawn run id.
pub fn run(config: &RunConfig, tracker: &dyn Tracker) -> Result<RunSummary> {
    let run_id = rand::thread_rng().gen_range(0..RUN_ID_RANGE);
    run_with_id(config, tracker, run_id)
}

pub fn run_with_id(config: &RunConfig, tracker: &dyn Tracker, run_id: u32) -> Result<RunSummary> {
    config.validate()?;

    let run_name = format!("{}{}", config.run_name_prefix(), run_id);
    info!("Starting run {}", run_name);

    let split = DatasetLoader::new(&config.data.train_flag_column, &config.data.target_column)
        .load(&config.data.dataset)?;
    let folds = KFold::new(config.cv.n_folds, config.cv.shuffle, config.cv.seed)
        .split(split.n_train())?;
    let columns = serde_json::to_string(&split.feature_names)?;

    // per-fold model files live here until the tracker has copied them
    let scratch = tempfile::tempdir()?;

    let n_folds = folds.len();
    let mut predictions = PredictionAccumulator::new(split.n_test(), n_folds);
    let mut scores = ScoreAccumulator::new(n_folds);
    let mut reports = Vec::with_capacity(n_folds);

    for fold in &folds {
        let experiment = format!("fold_{}", fold.index + 1);
        let report = with_run(tracker, &experiment, &run_name, |run| {
            let (outcome, params) = train_fold(config, &split, fold)?;
            let fold_predictions = outcome.booster.predict(&split.test)?;
            predictions.add(&fold_predictions)?;
            scores.add(outcome.best_score)?;

            info!(
                "Fold {} done: valid rmse {:.6} at iteration {} of {}",
                fold.index + 1,
                outcome.best_score,
                outcome.best_iteration + 1,
                outcome.history.rounds()
            );

            let artifact_dir = scratch.path().join(&experiment);
            log_fold(
                tracker,
                run,
                config,
                fold.index + 1,
                &columns,
                &split.feature_names,
                &outcome,
                &params,
                &artifact_dir,
            )
        })?;
        reports.push(report);
    }

    let averaged = predictions.finish()?;
    let score = scores.mean()?;
    info!("Cross-validated rmse {:.6} over {} folds", score, n_folds);

    let submission = export_submission(
        &config.data.template,
        &config.data.output_dir,
        run_id,
        &averaged,
    )?;

    with_run(tracker, AGGREGATE_EXPERIMENT, &run_name, |run| {
        tracker.log_metrics(
            run,
            &[
                MetricPoint::new("all_rmse", score),
                MetricPoint::new("all_rmse_round", round4(score)),
                MetricPoint::new("all_score - 10000", leaderboard_score(score)),
            ],
        )?;
        tracker.log_param(run, "columns", &columns)?;
        tracker.log_artifact(run, &submission)
    })?;

    Ok(RunSummary {
        run_id,
        run_name,
        folds: reports,
        score,
        submission,
        n_predictions: averaged.len(),
    })
}

/// Fit one fold, searching parameters first when tuning is on. The fold's
/// matrices are dropped on return.
fn train_fold(
    config: &RunConfig,
    split: &TrainTestSplit,
    fold: &Fold,
) -> Result<(TrainOutcome, BoosterParams)> {
    let train: DMatrix = split.train.select_rows(&fold.train)?;
    let valid: DMatrix = split.train.select_rows(&fold.valid)?;

    if config.training.tune {
        let tuned = StepwiseTuner::new(config.tuned_params.clone(), config.train_options())
            .tune(&train, &valid)?;
        Ok((tuned.best, tuned.params))
    } else {
        let outcome = Trainer::new(config.params.clone(), config.train_options()).fit(&train, &valid)?;
        Ok((outcome, config.params.clone()))
    }
}

#[allow(clippy::too_many_arguments)]
fn log_fold(
    tracker: &dyn Tracker,
    run: &RunHandle,
    config: &RunConfig,
    fold: usize,
    columns: &str,
    feature_names: &[String],
    outcome: &TrainOutcome,
    params: &BoosterParams,
    artifact_dir: &Path,
) -> Result<FoldReport> {
    let mut metrics = vec![
        MetricPoint::new(format!("fold_{}_rmse", fold), outcome.best_score),
        MetricPoint::new("score - 10000", leaderboard_score(outcome.best_score)),
        MetricPoint::new("best_iteration", (outcome.best_iteration + 1) as f64),
    ];
    for (step, (train, valid)) in outcome
        .history
        .train_rmse
        .iter()
        .zip(&outcome.history.valid_rmse)
        .enumerate()
    {
        metrics.push(MetricPoint::new("train-rmse", *train).at_step(step as i64));
        metrics.push(MetricPoint::new("valid-rmse", *valid).at_step(step as i64));
    }
    tracker.log_metrics(run, &metrics)?;

    let model_hash = outcome.booster.hash_hex()?;
    let mut logged: BTreeMap<String, String> = params.to_param_map();
    logged.insert("columns".to_string(), columns.to_string());
    logged.insert(
        "num_boost_round".to_string(),
        config.training.num_boost_round.to_string(),
    );
    logged.insert(
        "early_stopping_rounds".to_string(),
        config.training.early_stopping_rounds.to_string(),
    );
    logged.insert("model_hash".to_string(), model_hash.clone());
    tracker.log_params(run, &logged)?;

    std::fs::create_dir_all(artifact_dir)?;
    let model_path = artifact_dir.join("model.json");
    outcome.booster.save_json(&model_path)?;
    tracker.log_artifact(run, &model_path)?;

    let importance_path = artifact_dir.join("feature_importance.json");
    std::fs::write(
        &importance_path,
        importance_json(&outcome.booster, feature_names)?,
    )?;
    tracker.log_artifact(run, &importance_path)?;

    Ok(FoldReport {
        fold,
        best_score: outcome.best_score,
        best_iteration: outcome.best_iteration + 1,
        rounds: outcome.history.rounds(),
        params: params.clone(),
        model_hash,
    })
}

fn importance_json(booster: &Booster, feature_names: &[String]) -> Result<String> {
    let split = booster.feature_importance(ImportanceType::Split);
    let gain = booster.feature_importance(ImportanceType::Gain);
    let rows: Vec<FeatureImportance<'_>> = feature_names
        .iter()
        .zip(split.iter().zip(&gain))
        .map(|(feature, (&split, &gain))| FeatureImportance {
            feature,
            split,
            gain,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Competition score for an RMSE
pub fn leaderboard_score(rmse: f64) -> f64 {
    (-rmse).exp() * 10_000.0
}

/// Half-to-even rounding at 4 decimals
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}
