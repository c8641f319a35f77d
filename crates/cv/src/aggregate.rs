//! Fold-averaged predictions and scores

use crate::errors::{PipelineError, Result};

/// Running average of per-fold test predictions.
///
/// Each fold adds `prediction / n_folds`; the sum is only handed out once
/// every fold has been added.
#[derive(Clone, Debug)]
pub struct PredictionAccumulator {
    sum: Vec<f64>,
    n_folds: usize,
    added: usize,
}

impl PredictionAccumulator {
    pub fn new(n_rows: usize, n_folds: usize) -> Self {
        Self {
            sum: vec![0.0; n_rows],
            n_folds,
            added: 0,
        }
    }

    pub fn add(&mut self, predictions: &[f64]) -> Result<()> {
        if predictions.len() != self.sum.len() {
            return Err(PipelineError::Aggregate(format!(
                "expected {} predictions, got {}",
                self.sum.len(),
                predictions.len()
            )));
        }
        if self.added == self.n_folds {
            return Err(PipelineError::Aggregate(format!(
                "all {} folds already added",
                self.n_folds
            )));
        }

        let n = self.n_folds as f64;
        for (acc, p) in self.sum.iter_mut().zip(predictions) {
            *acc += p / n;
        }
        self.added += 1;
        Ok(())
    }

    pub fn folds_added(&self) -> usize {
        self.added
    }

    /// Averaged predictions, available once all folds are in.
    pub fn finish(self) -> Result<Vec<f64>> {
        if self.added != self.n_folds {
            return Err(PipelineError::Aggregate(format!(
                "only {} of {} folds added",
                self.added, self.n_folds
            )));
        }
        Ok(self.sum)
    }
}

/// Running average of per-fold scalar scores
#[derive(Clone, Debug)]
pub struct ScoreAccumulator {
    scores: Vec<f64>,
    n_folds: usize,
}

impl ScoreAccumulator {
    pub fn new(n_folds: usize) -> Self {
        Self {
            scores: Vec::with_capacity(n_folds),
            n_folds,
        }
    }

    pub fn add(&mut self, score: f64) -> Result<()> {
        if self.scores.len() == self.n_folds {
            return Err(PipelineError::Aggregate(format!(
                "all {} fold scores already added",
                self.n_folds
            )));
        }
        self.scores.push(score);
        Ok(())
    }

    /// Scores in fold order
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn mean(&self) -> Result<f64> {
        if self.scores.len() != self.n_folds {
            return Err(PipelineError::Aggregate(format!(
                "only {} of {} fold scores added",
                self.scores.len(),
                self.n_folds
            )));
        }
        let n = self.n_folds as f64;
        Ok(self.scores.iter().map(|s| s / n).sum())
    }
}
