//! Integration tests for the booster
//!
//! Covers learning a known function, reproducibility and early stopping.

use anyhow::Result;
use shiptime_gbdt::{Booster, BoosterParams, DMatrix, TrainOptions, Trainer};

/// y = 3 * x0 - 2 * [x1 > 5] + small periodic noise
fn synthetic(n: usize, offset: usize) -> Result<DMatrix> {
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let k = i + offset;
        let x0 = (k % 53) as f64 / 10.0;
        let x1 = (k % 11) as f64;
        let x2 = if k % 13 == 0 { f64::NAN } else { (k % 17) as f64 };
        rows.push(vec![x0, x1, x2]);
        labels.push(3.0 * x0 - if x1 > 5.0 { 2.0 } else { 0.0 } + ((k % 5) as f64 - 2.0) * 0.01);
    }
    Ok(DMatrix::from_rows(&rows)?.with_labels(labels)?)
}

fn params() -> BoosterParams {
    BoosterParams {
        learning_rate: 0.1,
        num_leaves: 15,
        min_child_samples: 5,
        feature_fraction: 0.9,
        bagging_fraction: 0.8,
        bagging_freq: 1,
        seed: 22,
        ..Default::default()
    }
}

#[test]
fn test_learns_synthetic_function() -> Result<()> {
    let train = synthetic(400, 0)?;
    let valid = synthetic(100, 1000)?;
    let options = TrainOptions {
        num_boost_round: 200,
        early_stopping_rounds: 20,
        log_every: 50,
    };

    let outcome = Trainer::new(params(), options).fit(&train, &valid)?;

    assert!(
        outcome.best_score < 0.5,
        "validation rmse {} should be well below the label spread",
        outcome.best_score
    );
    assert_eq!(outcome.booster.num_trees(), outcome.best_iteration + 1);

    let predictions = outcome.booster.predict(&valid)?;
    assert_eq!(predictions.len(), valid.n_rows());
    let labels = valid.labels().unwrap_or_default();
    let rmse = shiptime_gbdt::rmse(&predictions, labels);
    assert!((rmse - outcome.best_score).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let train = synthetic(200, 0)?;
    let valid = synthetic(60, 500)?;
    let options = TrainOptions {
        num_boost_round: 40,
        early_stopping_rounds: 10,
        log_every: 0,
    };

    let model1 = Trainer::new(params(), options.clone()).fit(&train, &valid)?;
    let model2 = Trainer::new(params(), options).fit(&train, &valid)?;

    assert_eq!(model1.booster, model2.booster, "Models should be identical");
    assert_eq!(model1.best_score, model2.best_score);
    assert_eq!(
        model1.booster.hash_hex()?,
        model2.booster.hash_hex()?,
        "Model hashes should be identical"
    );

    Ok(())
}

#[test]
fn test_different_seed_changes_sampled_model() -> Result<()> {
    let train = synthetic(200, 0)?;
    let valid = synthetic(60, 500)?;
    let options = TrainOptions {
        num_boost_round: 20,
        ..Default::default()
    };

    let a = Trainer::new(params(), options.clone()).fit(&train, &valid)?;
    let b = Trainer::new(BoosterParams { seed: 23, ..params() }, options).fit(&train, &valid)?;

    assert_ne!(a.booster, b.booster);
    Ok(())
}

#[test]
fn test_early_stopping_on_noise() -> Result<()> {
    // validation labels unrelated to the features: the first rounds are the best
    let train = synthetic(300, 0)?;
    let rows: Vec<Vec<f64>> = (0..80).map(|i| vec![(i % 53) as f64 / 10.0, 0.0, 0.0]).collect();
    let labels = (0..80).map(|i| if i % 2 == 0 { 50.0 } else { -50.0 }).collect();
    let valid = DMatrix::from_rows(&rows)?.with_labels(labels)?;

    let options = TrainOptions {
        num_boost_round: 500,
        early_stopping_rounds: 10,
        log_every: 0,
    };
    let outcome = Trainer::new(params(), options).fit(&train, &valid)?;

    assert!(outcome.stopped_early);
    assert!(outcome.history.rounds() < 500);
    assert_eq!(outcome.history.rounds(), outcome.best_iteration + 11);
    Ok(())
}

#[test]
fn test_saved_model_predicts_identically() -> Result<()> {
    let train = synthetic(150, 0)?;
    let valid = synthetic(50, 300)?;
    let outcome = Trainer::new(params(), TrainOptions::default()).fit(&train, &valid)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.json");
    outcome.booster.save_json(&path)?;
    let restored = Booster::load_json(&path)?;

    assert_eq!(restored.predict(&valid)?, outcome.booster.predict(&valid)?);
    Ok(())
}
