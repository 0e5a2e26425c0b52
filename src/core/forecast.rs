//! Result structures returned by the forecaster.

use crate::core::frame::Frame;
use crate::error::Result;
use crate::utils::metrics::{calculate_metrics, AccuracyMetrics};

/// Point predictions together with the frame they were produced from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastOutput {
    /// One prediction per row of `frame`.
    pub predictions: Vec<f64>,
    /// Engineered frame, with the predictions in the target column.
    pub frame: Frame,
}

impl ForecastOutput {
    pub fn new(predictions: Vec<f64>, frame: Frame) -> Self {
        Self { predictions, frame }
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

/// Output of a rolling evaluation over a labeled test set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingEvaluation {
    /// One prediction per row of `frame`.
    pub predictions: Vec<f64>,
    /// Ground truth aligned with `predictions`; `NaN` where none was given.
    pub actuals: Vec<f64>,
    /// Engineered frame of all rolling windows.
    pub frame: Frame,
}

impl RollingEvaluation {
    /// Accuracy over rows that have both an actual and a prediction.
    pub fn metrics(&self) -> Result<AccuracyMetrics> {
        calculate_metrics(&self.actuals, &self.predictions)
    }
}
