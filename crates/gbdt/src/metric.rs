//! Evaluation metrics

/// Root mean squared error. Returns 0 for empty input.
pub fn rmse(predictions: &[f64], labels: &[f64]) -> f64 {
    debug_assert_eq!(predictions.len(), labels.len());
    if predictions.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();

    (sum_sq / predictions.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_perfect() {
        assert_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn rmse_known_value() {
        // errors 1, -1, 2, -2 -> mean square 2.5
        let value = rmse(&[2.0, 1.0, 5.0, 2.0], &[1.0, 2.0, 3.0, 4.0]);
        assert!((value - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rmse_empty() {
        assert_eq!(rmse(&[], &[]), 0.0);
    }
}
