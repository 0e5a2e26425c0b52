//! Capabilities the forecaster requires from trained pipeline components.

use crate::core::{Column, Frame, Frequency, GrainKey, GrainType};
use crate::error::{BoxError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Terminal estimator of a pipeline.
///
/// This trait is object-safe and is held as `Arc<dyn Regressor>`.
pub trait Regressor: Send + Sync {
    /// Predict one value per row of the engineered feature frame.
    fn predict(&self, features: &Frame) -> std::result::Result<Vec<f64>, BoxError>;

    /// Get the model name.
    fn name(&self) -> &str;
}

/// A frame-to-frame transformation step.
pub trait Featurizer: Send + Sync {
    fn transform(&self, frame: &Frame) -> Result<Frame>;
}

/// Fills missing target values of a single-series frame.
pub trait TargetImputer: Send + Sync {
    fn transform(&self, frame: &Frame) -> Result<Frame>;
}

/// Knows which series are long enough to be forecast.
pub trait ShortSeriesDropper: Send + Sync {
    fn grains_to_keep(&self) -> &BTreeSet<GrainKey>;
}

/// What happens to series that were not seen (or were too short) in training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShortSeriesPolicy {
    /// Silently drop them at transform time.
    Drop,
    /// Fail with an absent-grain data error.
    #[default]
    Reject,
}

/// Function used to aggregate the target and numeric features onto the
/// trained frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Sum,
    Mean,
    Min,
    Max,
}

impl AggregationFunction {
    /// Aggregate the non-null values; `NaN` when all are null.
    pub fn apply(&self, values: &[f64]) -> f64 {
        let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if valid.is_empty() {
            return f64::NAN;
        }
        match self {
            Self::Sum => valid.iter().sum(),
            Self::Mean => valid.iter().sum::<f64>() / valid.len() as f64,
            Self::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// The trained time-series featurizer and the model state it carries.
///
/// `transform` receives a prediction frame (time, grain, feature and target
/// columns, targets null where unknown) and returns the engineered frame. The
/// engineered frame keeps the time and grain columns, and the target column
/// when it carries known values.
pub trait TimeSeriesTransformer: Send + Sync {
    fn time_column_name(&self) -> &str;

    fn grain_column_names(&self) -> &[String];

    /// Types of the grain columns seen during training, parallel to
    /// `grain_column_names`.
    fn grain_column_types(&self) -> &[GrainType];

    fn target_column_name(&self) -> &str;

    /// Origin-time index column of multi-origin lag encodings.
    fn origin_column_name(&self) -> Option<&str> {
        None
    }

    /// Column holding the forecast horizon of each engineered row.
    fn horizon_column_name(&self) -> Option<&str> {
        None
    }

    /// Indicator column flagging rows whose target was imputed.
    fn missing_target_marker(&self) -> Option<&str> {
        None
    }

    fn freq(&self) -> Frequency;

    /// Last timestamp seen in training for every known series.
    fn last_training_dates(&self) -> &BTreeMap<GrainKey, DateTime<Utc>>;

    fn max_horizon(&self) -> usize;

    fn target_lags(&self) -> &[usize];

    fn rolling_window_size(&self) -> usize;

    /// Whether features depend on past target values.
    fn is_lookback_aware(&self) -> bool {
        self.target_lags().iter().any(|&l| l > 0) || self.rolling_window_size() > 0
    }

    /// Residual standard deviation for horizons `1..=max_horizon`.
    fn residual_stddev(&self) -> &[f64];

    fn y_imputer(&self, grain: &GrainKey) -> Option<&dyn TargetImputer>;

    /// Raw columns the pipeline expects besides time, grain and target.
    fn feature_columns(&self) -> &[String];

    /// Step filling missing numeric feature values.
    fn numeric_imputer(&self) -> &dyn Featurizer;

    fn short_series_dropper(&self) -> Option<&dyn ShortSeriesDropper> {
        None
    }

    fn short_series_policy(&self) -> ShortSeriesPolicy {
        if self.short_series_dropper().is_some() {
            ShortSeriesPolicy::Drop
        } else {
            ShortSeriesPolicy::Reject
        }
    }

    fn target_aggregation(&self) -> Option<AggregationFunction> {
        None
    }

    fn transform(&self, frame: &Frame) -> Result<Frame>;

    /// Keep only the latest origin per (grain, time).
    ///
    /// Frames without the origin column are returned unchanged.
    fn select_latest_origin(&self, frame: &Frame) -> Result<Frame> {
        let Some(origin_col) = self.origin_column_name() else {
            return Ok(frame.clone());
        };
        let origins = match frame.column(origin_col) {
            Some(Column::Time(v)) => v.clone(),
            _ => return Ok(frame.clone()),
        };
        let times = frame.times(self.time_column_name())?;
        let keys = frame.grain_keys(self.grain_column_names())?;

        let mut latest: HashMap<(GrainKey, DateTime<Utc>), usize> = HashMap::new();
        let mut order = Vec::new();
        for (row, key) in keys.into_iter().enumerate() {
            let slot = (key, times[row]);
            match latest.get(&slot) {
                Some(&best) if origins[best] >= origins[row] => {}
                Some(_) => {
                    latest.insert(slot, row);
                }
                None => {
                    order.push(slot.clone());
                    latest.insert(slot, row);
                }
            }
        }
        let rows: Vec<usize> = order.iter().filter_map(|s| latest.get(s).copied()).collect();
        Ok(frame.take(&rows))
    }
}
