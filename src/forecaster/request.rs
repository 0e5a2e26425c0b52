//! Caller-facing request types.

use crate::core::{Frame, GrainKey};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Known target values supplied with the prediction features.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetInput {
    /// One value per feature row, `NaN` where unknown.
    Values(Vec<f64>),
    /// A table holding the target column, optionally keyed by time and grain.
    Table(Frame),
    /// Row-major matrix; only a single column is accepted.
    Matrix(Vec<Vec<f64>>),
}

impl From<Vec<f64>> for TargetInput {
    fn from(values: Vec<f64>) -> Self {
        Self::Values(values)
    }
}

impl From<Frame> for TargetInput {
    fn from(frame: Frame) -> Self {
        Self::Table(frame)
    }
}

/// Timestamp to forecast up to when no features are supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Timestamp(DateTime<Utc>),
    /// Parsed with the same formats as a text time column.
    Text(String),
    /// Per-series destinations are not supported and are rejected.
    PerSeries(BTreeMap<GrainKey, DateTime<Utc>>),
}

impl From<DateTime<Utc>> for Destination {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Arguments of `forecast` and `forecast_quantiles`.
///
/// # Example
///
/// ```
/// use forecast_pipeline::forecaster::ForecastRequest;
/// use chrono::{TimeZone, Utc};
///
/// let request = ForecastRequest::new()
///     .with_destination(Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap())
///     .ignore_data_errors(true);
/// assert!(request.features().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastRequest {
    features: Option<Frame>,
    target: Option<TargetInput>,
    destination: Option<Destination>,
    ignore_data_errors: bool,
}

impl ForecastRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prediction features (`X_future`).
    pub fn with_features(mut self, frame: Frame) -> Self {
        self.features = Some(frame);
        self
    }

    /// Known targets (`y_future`).
    pub fn with_target(mut self, target: impl Into<TargetInput>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<Destination>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Demote recoverable data errors to warnings.
    pub fn ignore_data_errors(mut self, ignore: bool) -> Self {
        self.ignore_data_errors = ignore;
        self
    }

    pub fn features(&self) -> Option<&Frame> {
        self.features.as_ref()
    }

    pub fn target(&self) -> Option<&TargetInput> {
        self.target.as_ref()
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn ignores_data_errors(&self) -> bool {
        self.ignore_data_errors
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Option<Frame>, Option<TargetInput>, Option<Destination>, bool) {
        (
            self.features,
            self.target,
            self.destination,
            self.ignore_data_errors,
        )
    }
}
