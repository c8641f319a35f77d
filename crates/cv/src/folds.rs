//! K-fold splitting of training row indices

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{PipelineError, Result};

/// One cross-validation fold. Both index lists are sorted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    /// Zero-based fold number
    pub index: usize,
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// K-fold splitter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle,
            seed,
        }
    }

    /// Partition `0..n_rows` into `n_splits` validation sets.
    ///
    /// Every fold gets `n_rows / n_splits` rows and the first
    /// `n_rows % n_splits` folds one extra.
    pub fn split(&self, n_rows: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(PipelineError::Folds(format!(
                "need at least 2 folds, got {}",
                self.n_splits
            )));
        }
        if n_rows < self.n_splits {
            return Err(PipelineError::Folds(format!(
                "cannot split {} rows into {} folds",
                n_rows, self.n_splits
            )));
        }

        let mut order: Vec<usize> = (0..n_rows).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        let base = n_rows / self.n_splits;
        let extra = n_rows % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;

        for index in 0..self.n_splits {
            let size = base + usize::from(index < extra);
            let mut valid = order[start..start + size].to_vec();
            valid.sort_unstable();
            start += size;

            let mut in_valid = vec![false; n_rows];
            for &i in &valid {
                in_valid[i] = true;
            }
            let train = (0..n_rows).filter(|&i| !in_valid[i]).collect();

            folds.push(Fold {
                index,
                train,
                valid,
            });
        }

        Ok(folds)
    }
}
