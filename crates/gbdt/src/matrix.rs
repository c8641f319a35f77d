//! Dense row-major feature matrix with optional labels

use crate::errors::{GbdtError, Result};

/// Feature matrix handed to the trainer and predictor.
///
/// Missing values are stored as `f64::NAN`.
#[derive(Clone, Debug, PartialEq)]
pub struct DMatrix {
    values: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
    labels: Option<Vec<f64>>,
}

impl DMatrix {
    /// Build a matrix from row-major values.
    pub fn from_row_major(values: Vec<f64>, n_rows: usize, n_cols: usize) -> Result<Self> {
        if values.len() != n_rows * n_cols {
            return Err(GbdtError::InvalidData(format!(
                "expected {} values for a {}x{} matrix, got {}",
                n_rows * n_cols,
                n_rows,
                n_cols,
                values.len()
            )));
        }

        Ok(Self {
            values,
            n_rows,
            n_cols,
            labels: None,
        })
    }

    /// Build a matrix from a list of rows. All rows must have the same width.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * n_cols);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(GbdtError::InvalidData(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n_cols
                )));
            }
            values.extend_from_slice(row);
        }

        Self::from_row_major(values, rows.len(), n_cols)
    }

    /// Attach labels, one per row.
    pub fn with_labels(mut self, labels: Vec<f64>) -> Result<Self> {
        if labels.len() != self.n_rows {
            return Err(GbdtError::InvalidData(format!(
                "got {} labels for {} rows",
                labels.len(),
                self.n_rows
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Copy the given rows (and their labels) into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let mut values = Vec::with_capacity(indices.len() * self.n_cols);
        for &idx in indices {
            if idx >= self.n_rows {
                return Err(GbdtError::InvalidData(format!(
                    "row index {} out of range for {} rows",
                    idx, self.n_rows
                )));
            }
            values.extend_from_slice(self.row(idx));
        }

        let labels = self
            .labels
            .as_ref()
            .map(|labels| indices.iter().map(|&i| labels[i]).collect());

        Ok(Self {
            values,
            n_rows: indices.len(),
            n_cols: self.n_cols,
            labels,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Row slice
    pub fn row(&self, idx: usize) -> &[f64] {
        let start = idx * self.n_cols;
        &self.values[start..start + self.n_cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_cols + col]
    }

    pub fn labels(&self) -> Option<&[f64]> {
        self.labels.as_deref()
    }

    /// Labels, or an error naming the matrix role when they are absent.
    pub fn require_labels(&self, role: &str) -> Result<&[f64]> {
        self.labels()
            .ok_or_else(|| GbdtError::InvalidData(format!("{} matrix has no labels", role)))
    }
}
