//! Accuracy metrics for rolling-evaluation scoring.

use crate::error::{ForecastError, Result};

/// Accuracy metrics comparing actual targets with predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    /// Number of scored rows
    pub n: usize,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (None if zeros in actual)
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// R-squared (coefficient of determination)
    pub r_squared: f64,
}

/// Calculate accuracy metrics between actual and predicted values.
///
/// Rows where either value is `NaN` are skipped, so partially known
/// actuals can be scored directly.
///
/// # Arguments
/// * `actual` - Actual observed values
/// * `predicted` - Predicted values, same length as `actual`
pub fn calculate_metrics(actual: &[f64], predicted: &[f64]) -> Result<AccuracyMetrics> {
    if actual.len() != predicted.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }

    let pairs: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, p)| !a.is_nan() && !p.is_nan())
        .map(|(&a, &p)| (a, p))
        .collect();
    if pairs.is_empty() {
        return Err(ForecastError::EmptyData);
    }

    let n = pairs.len() as f64;

    let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let mse = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();

    let mape = if pairs.iter().any(|(a, _)| *a == 0.0) {
        None
    } else {
        let sum: f64 = pairs.iter().map(|(a, p)| ((a - p) / a).abs()).sum();
        Some(100.0 * sum / n)
    };

    let smape = pairs
        .iter()
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n;

    let mean_actual = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let ss_tot: f64 = pairs.iter().map(|(a, _)| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(AccuracyMetrics {
        n: pairs.len(),
        mae,
        mse,
        rmse,
        mape,
        smape,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn calculate_metrics_perfect_prediction() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let metrics = calculate_metrics(&actual, &actual).unwrap();

        assert_relative_eq!(metrics.mae, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.smape, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.r_squared, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn calculate_metrics_known_values() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let predicted = vec![1.5, 2.5, 2.5, 4.5, 4.5];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();

        assert_relative_eq!(metrics.mae, 0.5, epsilon = 1e-10);
        assert_relative_eq!(metrics.mse, 0.25, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn calculate_metrics_skips_missing_rows() {
        let actual = vec![1.0, f64::NAN, 3.0];
        let predicted = vec![2.0, 100.0, f64::NAN];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();

        assert_eq!(metrics.n, 1);
        assert_relative_eq!(metrics.mae, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn calculate_metrics_mape_with_zeros() {
        let metrics = calculate_metrics(&[0.0, 1.0, 2.0], &[0.1, 1.1, 2.1]).unwrap();

        assert!(metrics.mape.is_none());
        assert!(metrics.smape.is_finite());
    }

    #[test]
    fn calculate_metrics_dimension_mismatch() {
        let result = calculate_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn calculate_metrics_nothing_to_score() {
        assert!(matches!(
            calculate_metrics(&[], &[]),
            Err(ForecastError::EmptyData)
        ));
        assert!(matches!(
            calculate_metrics(&[f64::NAN], &[1.0]),
            Err(ForecastError::EmptyData)
        ));
    }

    #[test]
    fn r_squared_negative_for_poor_model() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let predicted = vec![5.0, 4.0, 3.0, 2.0, 1.0];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();

        assert!(metrics.r_squared < 0.0);
    }
}
