//! Property-based tests for the forecaster.
//!
//! The fixture pipeline predicts `y_lag1 + horizon` from a training tail
//! ending at 05:00 with value 3, so every invariant below has a closed form.

mod common;

use common::*;
use forecast_pipeline::forecaster::WindowStep;
use forecast_pipeline::pipeline::AggregationFunction;
use forecast_pipeline::prelude::*;
use proptest::prelude::*;

/// Strategy for a run of consecutive hours starting at 06:00.
fn hours_strategy(max_len: u32) -> impl Strategy<Value = Vec<u32>> {
    (1..=max_len).prop_map(|n| (6..6 + n).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Output rows follow the input rows, whatever their order.
    #[test]
    fn output_follows_input_order(hours in Just(vec![6u32, 7, 8]).prop_shuffle()) {
        let mut forecaster = forecaster();
        let output = forecaster
            .forecast(ForecastRequest::new().with_features(features(&hours)))
            .unwrap();
        let expected: Vec<_> = hours.iter().map(|&h| at(h)).collect();
        prop_assert_eq!(output.frame.times("date").unwrap(), expected);
        for (&h, &p) in hours.iter().zip(&output.predictions) {
            prop_assert_eq!(p, h as f64 - 2.0);
        }
    }

    /// A destination forecast covers every grid step after training.
    #[test]
    fn destination_rows_lie_on_the_grid(destination in 6u32..=23) {
        let mut forecaster = forecaster();
        let output = forecaster
            .forecast(ForecastRequest::new().with_destination(at(destination)))
            .unwrap();
        let expected: Vec<_> = (6..=destination).map(at).collect();
        prop_assert_eq!(output.frame.times("date").unwrap(), expected);
    }

    /// A destination never combines with features.
    #[test]
    fn destination_excludes_features(destination in 6u32..=23, hours in hours_strategy(5)) {
        let mut forecaster = forecaster();
        let err = forecaster
            .forecast(
                ForecastRequest::new()
                    .with_destination(at(destination))
                    .with_features(features(&hours)),
            )
            .unwrap_err();
        prop_assert_eq!(err.reference_code(), ReferenceCode::DestinationAndFeatures);
    }

    /// Known targets come back unchanged.
    #[test]
    fn known_targets_are_returned(
        (n, known) in (2usize..=10).prop_flat_map(|n| (Just(n), prop::collection::vec(-50.0..50.0_f64, 1..n)))
    ) {
        let hours: Vec<u32> = (6..6 + n as u32).collect();
        let mut y = known.clone();
        y.resize(n, f64::NAN);
        let mut forecaster = forecaster();
        let output = forecaster
            .forecast(ForecastRequest::new().with_features(features(&hours)).with_target(y))
            .unwrap();
        prop_assert_eq!(&output.predictions[..known.len()], known.as_slice());
        prop_assert!(output.predictions[known.len()..].iter().all(|p| p.is_finite()));
    }

    /// Recursion gives the same forecasts as iterating the windows by hand.
    #[test]
    fn recursive_forecast_matches_windows(hours in hours_strategy(15)) {
        let mut forecaster = forecaster();
        let output = forecaster
            .forecast(ForecastRequest::new().with_features(features(&hours)))
            .unwrap();
        let steps: Vec<WindowStep> = forecaster
            .forecast_windows(ForecastRequest::new().with_features(features(&hours)))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let windowed: Vec<f64> = steps
            .iter()
            .flat_map(|s| s.predictions.predictions.iter().copied())
            .collect();
        prop_assert_eq!(steps.len(), (hours.len() + 2) / 3);
        prop_assert_eq!(&output.predictions, &windowed);
    }

    /// Each rolling window starts from the ground truth before its origin.
    #[test]
    fn rolling_windows_use_truth(y in prop::collection::vec(-100.0..100.0_f64, 1..=12)) {
        let hours: Vec<u32> = (6..6 + y.len() as u32).collect();
        let mut forecaster = forecaster();
        let eval = forecaster
            .rolling_evaluation(&features(&hours), y.clone().into(), false)
            .unwrap();
        prop_assert_eq!(eval.predictions.len(), y.len());
        for (j, &p) in eval.predictions.iter().enumerate() {
            let context = if j < 3 { 3.0 } else { y[3 * (j / 3) - 1] };
            let expected = context + (j % 3 + 1) as f64;
            prop_assert!((p - expected).abs() < 1e-9, "row {}: {} != {}", j, p, expected);
        }
        prop_assert_eq!(eval.actuals, y);
    }

    /// Quantile columns are ordered and symmetric around the median.
    #[test]
    fn quantiles_are_monotone_and_symmetric(hours in hours_strategy(12)) {
        let mut forecaster = forecaster();
        forecaster.set_quantiles(vec![0.1, 0.25, 0.5, 0.75, 0.9]).unwrap();
        let table = forecaster
            .forecast_quantiles(ForecastRequest::new().with_features(features(&hours)))
            .unwrap();
        let columns: Vec<Vec<f64>> = ["0.1", "0.25", "0.5", "0.75", "0.9"]
            .iter()
            .map(|name| table.floats(name).unwrap())
            .collect();
        for row in 0..hours.len() {
            for pair in columns.windows(2) {
                prop_assert!(pair[0][row] <= pair[1][row]);
            }
            let median = columns[2][row];
            prop_assert!(((columns[4][row] - median) - (median - columns[0][row])).abs() < 1e-9);
        }
    }

    /// Regular hourly input is not touched by pre-aggregation.
    #[test]
    fn aggregation_is_a_no_op_on_regular_input(hours in hours_strategy(3)) {
        let request = ForecastRequest::new().with_features(features(&hours));
        let plain = forecaster().forecast(request.clone()).unwrap();
        let mut aggregating =
            Forecaster::new(pipeline_with(transformer().with_aggregation(AggregationFunction::Sum)));
        let aggregated = aggregating.forecast(request).unwrap();
        prop_assert_eq!(plain.predictions, aggregated.predictions);
    }
}
