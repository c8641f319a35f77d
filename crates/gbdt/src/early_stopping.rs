//! Early stopping on a validation metric where lower is better

/// Tracks the best validation score and signals when it has not improved
/// for `patience` rounds.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
}

impl EarlyStopping {
    /// `patience == 0` disables stopping; the best round is still tracked.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_value: None,
            best_round: 0,
            current_round: 0,
        }
    }

    /// Record the score of the current round. Returns `true` once the last
    /// `patience` rounds brought no improvement.
    pub fn should_stop(&mut self, value: f64) -> bool {
        let improved = match self.best_value {
            None => true,
            Some(best) => value < best,
        };

        if improved {
            self.best_value = Some(value);
            self.best_round = self.current_round;
        }

        self.current_round += 1;

        self.patience > 0 && self.current_round - self.best_round > self.patience
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// Zero-based round of the best score
    pub fn best_round(&self) -> usize {
        self.best_round
    }
}
