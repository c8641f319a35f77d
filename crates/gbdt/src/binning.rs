//! Feature quantization
//!
//! Each column is cut into at most `max_bin` bins using equal-frequency
//! boundaries computed from the training rows. Split search works on bin
//! indices; the trees themselves store the raw upper bound of the split bin,
//! so prediction never needs the mapper.

use crate::matrix::DMatrix;

/// Bin boundaries for a single feature.
///
/// A value `x` falls into the first bin `i` with `x <= upper_bounds[i]`;
/// values above every bound go to the last bin. Missing values go to bin 0.
#[derive(Clone, Debug, PartialEq)]
pub struct BinMapper {
    upper_bounds: Vec<f64>,
}

impl BinMapper {
    /// Compute boundaries from the observed values of one column.
    pub fn fit(values: impl IntoIterator<Item = f64>, max_bin: usize) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        // distinct values with counts
        let mut distinct: Vec<(f64, usize)> = Vec::new();
        for v in sorted.iter().copied() {
            match distinct.last_mut() {
                Some((last, count)) if *last == v => *count += 1,
                _ => distinct.push((v, 1)),
            }
        }

        let max_bin = max_bin.max(2);
        let mut upper_bounds = Vec::new();

        if distinct.len() <= max_bin {
            for pair in distinct.windows(2) {
                upper_bounds.push(midpoint(pair[0].0, pair[1].0));
            }
        } else {
            let per_bin = (sorted.len() as f64 / max_bin as f64).max(1.0);
            let mut in_bin = 0usize;
            for (i, &(value, count)) in distinct.iter().enumerate() {
                in_bin += count;
                let is_last = i + 1 == distinct.len();
                if !is_last && in_bin as f64 >= per_bin && upper_bounds.len() + 1 < max_bin {
                    upper_bounds.push(midpoint(value, distinct[i + 1].0));
                    in_bin = 0;
                }
            }
        }

        Self { upper_bounds }
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len() + 1
    }

    /// Bin index for a raw value
    pub fn bin(&self, value: f64) -> u16 {
        if value.is_nan() {
            return 0;
        }
        self.upper_bounds.partition_point(|b| *b < value) as u16
    }

    /// Raw threshold for a split placing bins `0..=bin` on the left.
    pub fn threshold(&self, bin: u16) -> f64 {
        self.upper_bounds[bin as usize]
    }
}

fn midpoint(lower: f64, upper: f64) -> f64 {
    let mid = lower + (upper - lower) / 2.0;
    if mid >= upper || !mid.is_finite() {
        lower
    } else {
        mid
    }
}

/// Column-major bin indices for a training matrix.
#[derive(Clone, Debug)]
pub struct BinnedMatrix {
    mappers: Vec<BinMapper>,
    columns: Vec<Vec<u16>>,
    n_rows: usize,
}

impl BinnedMatrix {
    /// Quantize every column of `matrix`.
    pub fn from_matrix(matrix: &DMatrix, max_bin: usize) -> Self {
        let n_rows = matrix.n_rows();
        let mut mappers = Vec::with_capacity(matrix.n_cols());
        let mut columns = Vec::with_capacity(matrix.n_cols());

        for col in 0..matrix.n_cols() {
            let mapper = BinMapper::fit((0..n_rows).map(|row| matrix.get(row, col)), max_bin);
            let column = (0..n_rows)
                .map(|row| mapper.bin(matrix.get(row, col)))
                .collect();
            mappers.push(mapper);
            columns.push(column);
        }

        Self {
            mappers,
            columns,
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.mappers.len()
    }

    pub fn mapper(&self, feature: usize) -> &BinMapper {
        &self.mappers[feature]
    }

    pub fn column(&self, feature: usize) -> &[u16] {
        &self.columns[feature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let mapper = BinMapper::fit(vec![1.0, 2.0, 2.0, 3.0], 255);
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(2.0), 1);
        assert_eq!(mapper.bin(3.0), 2);
        assert_eq!(mapper.threshold(0), 1.5);
    }

    #[test]
    fn test_bin_count_capped() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let mapper = BinMapper::fit(values, 31);
        assert!(mapper.n_bins() <= 31);
        assert!(mapper.n_bins() >= 2);
    }

    #[test]
    fn test_bins_are_monotonic() {
        let values: Vec<f64> = (0..500).map(|i| (i % 97) as f64 * 0.5).collect();
        let mapper = BinMapper::fit(values.clone(), 16);
        let mut sorted = values;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let bins: Vec<u16> = sorted.iter().map(|&v| mapper.bin(v)).collect();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_missing_goes_to_first_bin() {
        let mapper = BinMapper::fit(vec![f64::NAN, 5.0, 6.0], 255);
        assert_eq!(mapper.n_bins(), 2);
        assert_eq!(mapper.bin(f64::NAN), 0);
    }

    #[test]
    fn test_threshold_agrees_with_bin() {
        let mapper = BinMapper::fit(vec![0.1, 0.2, 0.3, 0.4], 255);
        for bin in 0..mapper.n_bins() as u16 - 1 {
            let threshold = mapper.threshold(bin);
            assert!(mapper.bin(threshold) <= bin);
        }
    }

    #[test]
    fn test_binned_matrix_columns() {
        let matrix = DMatrix::from_rows(&[vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 20.0]])
            .unwrap();
        let binned = BinnedMatrix::from_matrix(&matrix, 255);
        assert_eq!(binned.n_features(), 2);
        assert_eq!(binned.column(0), &[0, 1, 2]);
        assert_eq!(binned.column(1), &[0, 0, 1]);
    }
}
