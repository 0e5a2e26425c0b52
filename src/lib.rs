//! # forecast-pipeline
//!
//! Multi-horizon forecasting on top of trained time-series regression
//! pipelines.
//!
//! A [`Forecaster`](forecaster::Forecaster) wraps a pipeline made of one
//! time-series featurizer, optional featurizers and a terminal regressor.
//! It builds prediction frames from features or a forecast destination,
//! fills the gap between training and prediction data, forecasts in a
//! single shot or on a rolling origin, and derives normal-approximation
//! quantiles.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod config;
pub mod core;
pub mod error;
pub mod forecaster;
pub mod models;
pub mod pipeline;
pub mod transform;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::config::{ForecasterConfig, LateContextPolicy, RecursionScope, UncertaintyGrowth};
    pub use crate::core::{Column, ForecastOutput, Frame, Frequency, GrainKey, RollingEvaluation};
    pub use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
    pub use crate::forecaster::{Destination, ForecastRequest, Forecaster, TargetInput};
    pub use crate::models::LinearRegressor;
    pub use crate::pipeline::Pipeline;
    pub use crate::transform::LagTransformer;
    pub use crate::utils::{calculate_metrics, quantile_normal, AccuracyMetrics};
}
