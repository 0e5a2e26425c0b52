//! Forecaster façade over a trained pipeline.
//!
//! A call runs through validation, optional pre-aggregation, prediction
//! frame construction, gap inference and forecasting (single-shot or
//! rolling-origin), then aligns the output to the input rows.
//!
//! # Example
//!
//! ```
//! use forecast_pipeline::prelude::*;
//! use forecast_pipeline::pipeline::PipelineStep;
//! use chrono::{TimeZone, Utc};
//! use std::sync::Arc;
//!
//! let last = Utc.with_ymd_and_hms(2020, 1, 1, 5, 0, 0).unwrap();
//! let transformer = LagTransformer::new("date", "y", Frequency::hourly())
//!     .with_max_horizon(3)
//!     .with_lags(vec![1])
//!     .with_horizon_column("horizon")
//!     .with_residual_stddev(vec![1.0, 1.5, 2.0])
//!     .with_history(GrainKey::dummy(), last, vec![1.0, 2.0, 3.0]);
//! let model = LinearRegressor::new(0.0).with_coefficient("y_lag1", 1.0);
//! let pipeline = Pipeline::new(vec![
//!     PipelineStep::TimeSeriesTransform(Arc::new(transformer)),
//!     PipelineStep::Regressor(Arc::new(model)),
//! ])
//! .unwrap();
//!
//! let mut forecaster = Forecaster::new(pipeline);
//! let destination = Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap();
//! let output = forecaster
//!     .forecast(ForecastRequest::new().with_destination(destination))
//!     .unwrap();
//! assert_eq!(output.predictions, vec![3.0, 3.0, 3.0]);
//! ```

mod aggregate;
mod diagnostics;
mod engine;
mod frame_builder;
mod gaps;
mod quantiles;
pub mod request;
mod validation;

pub use engine::{ForecastWindows, WindowStep};
pub use request::{Destination, ForecastRequest, TargetInput};
pub use validation::parse_timestamp;

use crate::config::{validate_quantiles, ForecasterConfig, RecursionScope};
use crate::core::{Column, ForecastOutput, Frame, GrainKey, RollingEvaluation};
use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
use crate::pipeline::{Pipeline, PipelineStep, TimeSeriesTransformer};
use aggregate::preaggregate;
use chrono::{DateTime, Utc};
use diagnostics::Diagnostics;
use engine::{
    align_output_to_input, recursion_targets, row_keys, single_shot, sort_output, trim_to_origin,
    TargetMap,
};
use frame_builder::{ensure_dummy_grain, from_destination, from_features, PredictionFrame};
use gaps::{infer_missing_data, is_grain_dropped, GapFillResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use validation::{validate_request, NormalizedTarget, PredictionInput};

/// Custom deviation growth: `(sigma, horizon, rollings) -> deviation`.
pub type SigmaFn = Arc<dyn Fn(f64, usize, usize) -> f64 + Send + Sync>;

/// Progress of the most recent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Fresh,
    Validated,
    Aggregated,
    Framed,
    GapFilled,
    Forecast,
    Aligned,
    Done,
    /// The call failed.
    Rejected,
}

#[derive(Debug, Default)]
struct CallState {
    forecast_origin: BTreeMap<GrainKey, DateTime<Utc>>,
    warnings: Vec<ForecastError>,
    stage: Stage,
}

/// Everything a forecast produces besides the aligned output.
struct ForecastRun {
    output: ForecastOutput,
    last_known: BTreeMap<GrainKey, Option<DateTime<Utc>>>,
    recursive: bool,
}

/// Input of the forecasting step: prediction frame, gap-filled frame and
/// the features the output is aligned to.
struct PreparedInput {
    framed: PredictionFrame,
    filled: GapFillResult,
    features: Option<Frame>,
}

/// Forecasting façade over a trained pipeline.
pub struct Forecaster {
    pipeline: Pipeline,
    config: ForecasterConfig,
    sigma_fn: Option<SigmaFn>,
    state: CallState,
}

impl fmt::Debug for Forecaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forecaster")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("custom_sigma", &self.sigma_fn.is_some())
            .field("stage", &self.state.stage)
            .finish()
    }
}

impl Forecaster {
    /// Create a forecaster with the default configuration.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            config: ForecasterConfig::default(),
            sigma_fn: None,
            state: CallState::default(),
        }
    }

    /// Replace the configuration after validating it.
    pub fn with_config(mut self, config: ForecasterConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Override how residual deviation grows, replacing the configured
    /// [`UncertaintyGrowth`](crate::config::UncertaintyGrowth).
    pub fn with_sigma_fn(mut self, sigma_fn: SigmaFn) -> Self {
        self.sigma_fn = Some(sigma_fn);
        self
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn time_series_transformer(&self) -> &Arc<dyn TimeSeriesTransformer> {
        self.pipeline.time_series_transformer()
    }

    /// Quantiles emitted by [`Forecaster::forecast_quantiles`].
    pub fn quantiles(&self) -> &[f64] {
        &self.config.quantiles
    }

    pub fn set_quantiles(&mut self, quantiles: Vec<f64>) -> Result<()> {
        validate_quantiles(&quantiles)?;
        self.config.quantiles = quantiles;
        Ok(())
    }

    /// First requested time of every series in the most recent call.
    pub fn forecast_origin(&self) -> &BTreeMap<GrainKey, DateTime<Utc>> {
        &self.state.forecast_origin
    }

    /// Data errors demoted to warnings in the most recent call.
    pub fn warnings(&self) -> &[ForecastError] {
        &self.state.warnings
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    /// Point forecasts for the request.
    ///
    /// With features, the output rows follow the input rows. With a
    /// destination, rows are sorted by time, then series.
    pub fn forecast(&mut self, request: ForecastRequest) -> Result<ForecastOutput> {
        self.run_call(request.ignores_data_errors(), |this, diag| {
            this.run_forecast(request, diag).map(|run| run.output)
        })
    }

    /// Prediction quantiles for the request, one column per configured
    /// quantile.
    pub fn forecast_quantiles(&mut self, request: ForecastRequest) -> Result<Frame> {
        self.run_call(request.ignores_data_errors(), |this, diag| {
            validate_quantiles(&this.config.quantiles)?;
            let run = this.run_forecast(request, diag)?;
            let ts = this.pipeline.time_series_transformer().clone();
            let growth = this.config.uncertainty_growth;
            let deviations = match &this.sigma_fn {
                Some(custom) => quantiles::row_deviations(
                    &run.output,
                    &run.last_known,
                    run.recursive,
                    ts.as_ref(),
                    custom.as_ref(),
                )?,
                None => quantiles::row_deviations(
                    &run.output,
                    &run.last_known,
                    run.recursive,
                    ts.as_ref(),
                    &|sigma: f64, _h: usize, m: usize| growth.apply(sigma, m),
                )?,
            };
            quantiles::quantile_frame(&run.output, &deviations, &this.config.quantiles, ts.as_ref())
        })
    }

    /// Forecast a labeled test set on a rolling origin.
    ///
    /// Each window forecasts `max_horizon` steps and uses the ground truth
    /// before its origin as context. Missing ground truth is imputed for the
    /// context only.
    pub fn rolling_evaluation(
        &mut self,
        x_test: &Frame,
        y_test: TargetInput,
        ignore_data_errors: bool,
    ) -> Result<RollingEvaluation> {
        let request = ForecastRequest::new()
            .with_features(x_test.clone())
            .with_target(y_test)
            .ignore_data_errors(ignore_data_errors);
        self.run_call(ignore_data_errors, |this, diag| this.run_rolling(request, diag))
    }

    /// Rolling-origin windows for the request, forecast lazily.
    ///
    /// Windows start at each series' first requested time and feed their
    /// predictions to the next window.
    pub fn forecast_windows(&mut self, request: ForecastRequest) -> Result<ForecastWindows> {
        self.run_call(request.ignores_data_errors(), |this, diag| {
            let prepared = this.prepare(request, diag)?;
            let ts = this.pipeline.time_series_transformer().clone();
            let grains = forecastable_series(&prepared.filled.frame, ts.as_ref())?;
            ForecastWindows::new(
                this.pipeline.clone(),
                &prepared.filled.frame,
                &grains,
                &prepared.framed.forecast_origin,
                None,
            )
        })
    }

    /// Run the pipeline steps up to the time-series transformer.
    ///
    /// The result is sorted by time and series, keeps the latest origin per
    /// row and has no target column.
    pub fn apply_time_series_transform(&self, x: &Frame, y: Option<&[f64]>) -> Result<Frame> {
        let ts = self.pipeline.time_series_transformer();
        let mut frame = x.clone();
        ensure_dummy_grain(&mut frame, ts.as_ref())?;
        if let Some(y) = y {
            frame.set_column(ts.target_column_name(), Column::Float(y.to_vec()))?;
        } else if !frame.has_column(ts.target_column_name()) {
            let len = frame.len();
            frame.set_column(ts.target_column_name(), Column::Float(vec![f64::NAN; len]))?;
        }
        for step in self.pipeline.steps() {
            match step {
                PipelineStep::TimeSeriesTransform(transformer) => {
                    let engineered = transformer.transform(&frame)?;
                    let mut engineered = transformer.select_latest_origin(&engineered)?;
                    let mut keys = vec![ts.time_column_name().to_string()];
                    keys.extend(ts.grain_column_names().iter().cloned());
                    if let Some(origin) = ts.origin_column_name() {
                        if engineered.has_column(origin) {
                            keys.push(origin.to_string());
                        }
                    }
                    engineered = engineered.sort_by_keys(&keys)?;
                    engineered.remove_column(ts.target_column_name());
                    return Ok(engineered);
                }
                PipelineStep::Featurizer(featurizer) => {
                    frame = featurizer.transform(&frame)?;
                }
                PipelineStep::Regressor(_) => break,
            }
        }
        Err(ForecastError::config(
            ReferenceCode::NoTimeSeriesTransform,
            "the pipeline does not contain a time-series transformer",
        ))
    }

    /// Always fails: a forecaster needs the time context `forecast` provides.
    pub fn predict(&self, _x: &Frame) -> Result<Vec<f64>> {
        tracing::error!("predict called on a forecasting pipeline");
        Err(ForecastError::PredictNotSupported)
    }

    fn run_call<T>(
        &mut self,
        ignore_data_errors: bool,
        call: impl FnOnce(&mut Self, &mut Diagnostics) -> Result<T>,
    ) -> Result<T> {
        self.state = CallState::default();
        let mut diag = Diagnostics::new(ignore_data_errors);
        let result = call(self, &mut diag);
        if !diag.warnings().is_empty() {
            tracing::debug!(warnings = diag.warnings().len(), "data errors were demoted to warnings");
        }
        self.state.warnings = diag.into_warnings();
        match &result {
            Ok(_) => self.state.stage = Stage::Done,
            Err(err) => {
                tracing::debug!(code = %err.reference_code(), stage = ?self.state.stage, "forecast call rejected");
                self.state.stage = Stage::Rejected;
            }
        }
        result
    }

    /// Validate, aggregate, frame and gap-fill the request.
    fn prepare(&mut self, request: ForecastRequest, diag: &mut Diagnostics) -> Result<PreparedInput> {
        let ts = self.pipeline.time_series_transformer().clone();
        let normalized = validate_request(request, ts.as_ref())?;
        self.state.stage = Stage::Validated;

        let (framed, features) = match normalized.input {
            PredictionInput::Features { mut x, y } => {
                ensure_dummy_grain(&mut x, ts.as_ref())?;
                let (x, y) = preaggregate(x, y, ts.as_ref())?;
                self.state.stage = Stage::Aggregated;
                let framed = from_features(x.clone(), y.as_ref(), ts.as_ref(), diag)?;
                (framed, Some(x))
            }
            PredictionInput::Destination(destination) => {
                (from_destination(destination, ts.as_ref())?, None)
            }
        };
        self.state.forecast_origin = framed.forecast_origin.clone();
        self.state.stage = Stage::Framed;

        let filled = infer_missing_data(&framed.frame, ts.as_ref(), self.config.late_context, diag, false)?;
        self.state.stage = Stage::GapFilled;
        Ok(PreparedInput {
            framed,
            filled,
            features,
        })
    }

    fn run_forecast(&mut self, request: ForecastRequest, diag: &mut Diagnostics) -> Result<ForecastRun> {
        let ts = self.pipeline.time_series_transformer().clone();
        let prepared = self.prepare(request, diag)?;
        let origins = &prepared.framed.forecast_origin;

        let targets = recursion_targets(&prepared.framed.frame, ts.as_ref(), self.config.late_context)?;
        let recursive = ts.is_lookback_aware() && !targets.is_empty();
        let output = if recursive {
            let windowed = match self.config.recursion_scope {
                RecursionScope::AllSeries => forecastable_series(&prepared.filled.frame, ts.as_ref())?,
                RecursionScope::PerSeries => targets,
            };
            tracing::debug!(series = windowed.len(), "forecasting recursively beyond the max horizon");
            let windows = ForecastWindows::new(
                self.pipeline.clone(),
                &prepared.filled.frame,
                &windowed,
                origins,
                None,
            )?
            .into_output(None)?;

            let keys = row_keys(&prepared.filled.frame, ts.as_ref())?;
            let mask: Vec<bool> = keys.iter().map(|(g, _)| !windowed.contains(g)).collect();
            let rest = prepared.filled.frame.filter(&mask);
            if rest.is_empty() {
                windows
            } else {
                let direct = trim_to_origin(single_shot(&self.pipeline, &rest)?, origins, ts.as_ref())?;
                let frame = Frame::concat(&[windows.frame, direct.frame])?;
                let mut predictions = windows.predictions;
                predictions.extend(direct.predictions);
                ForecastOutput::new(predictions, frame)
            }
        } else {
            tracing::debug!("forecasting in a single shot");
            trim_to_origin(single_shot(&self.pipeline, &prepared.filled.frame)?, origins, ts.as_ref())?
        };
        self.state.stage = Stage::Forecast;

        let output = match &prepared.features {
            Some(x) => align_output_to_input(x, output, ts.as_ref())?,
            None => sort_output(output, ts.as_ref())?,
        };
        self.state.stage = Stage::Aligned;
        Ok(ForecastRun {
            output,
            last_known: prepared.filled.last_known,
            recursive,
        })
    }

    fn run_rolling(&mut self, request: ForecastRequest, diag: &mut Diagnostics) -> Result<RollingEvaluation> {
        let ts = self.pipeline.time_series_transformer().clone();
        let normalized = validate_request(request, ts.as_ref())?;
        let PredictionInput::Features { mut x, y } = normalized.input else {
            return Err(ForecastError::config(
                ReferenceCode::NoDestinationOrFeatures,
                "rolling evaluation requires X_test",
            ));
        };
        let has_truth = match &y {
            Some(NormalizedTarget::Values(v)) => v.iter().any(|v| !v.is_nan()),
            Some(NormalizedTarget::Table(t)) => !t.require(ts.target_column_name())?.is_all_null(),
            None => false,
        };
        if !has_truth {
            return Err(ForecastError::data(DataErrorKind::RollingEvaluationNoY));
        }
        self.state.stage = Stage::Validated;

        ensure_dummy_grain(&mut x, ts.as_ref())?;
        let (x, y) = preaggregate(x, y, ts.as_ref())?;
        self.state.stage = Stage::Aggregated;
        let framed = from_features(x.clone(), y.as_ref(), ts.as_ref(), diag)?;
        self.state.forecast_origin = framed.forecast_origin.clone();
        self.state.stage = Stage::Framed;

        let target = ts.target_column_name();
        let times = framed.frame.times(ts.time_column_name())?;
        let mut actuals = TargetMap::new();
        let mut observed = TargetMap::new();
        let mut parts = Vec::new();
        for (grain, mut rows) in framed.frame.group_by_grain(ts.grain_column_names())? {
            if is_grain_dropped(ts.as_ref(), &grain) {
                continue;
            }
            rows.sort_by_key(|&r| times[r]);
            let mut series = framed.frame.take(&rows);
            let given = series.floats(target)?;
            for (&r, &value) in rows.iter().zip(&given) {
                if !value.is_nan() {
                    observed.insert((grain.clone(), times[r]), value);
                }
            }
            if given.iter().any(|v| v.is_nan()) {
                let imputer = ts.y_imputer(&grain).ok_or_else(|| {
                    if ts.last_training_dates().contains_key(&grain) {
                        ForecastError::untrained(
                            ReferenceCode::NoTargetImputer,
                            format!("no target imputer is available for time series {grain}"),
                        )
                    } else {
                        ForecastError::data(DataErrorKind::AbsentGrain {
                            grain: grain.to_string(),
                        })
                    }
                })?;
                series = imputer.transform(&series)?;
            }
            for (&r, &value) in rows.iter().zip(&series.floats(target)?) {
                actuals.insert((grain.clone(), times[r]), value);
            }
            let len = series.len();
            series.set_column(target, Column::Float(vec![f64::NAN; len]))?;
            parts.push(series);
        }

        let blanked = if parts.is_empty() {
            framed.frame.filter(&vec![false; framed.frame.len()])
        } else {
            Frame::concat(&parts)?
        };
        // Each window infers its own missing data from its origin.
        self.state.stage = Stage::GapFilled;
        let grains = forecastable_series(&blanked, ts.as_ref())?;
        let output = ForecastWindows::new(
            self.pipeline.clone(),
            &blanked,
            &grains,
            &framed.forecast_origin,
            Some(&actuals),
        )?
        .with_gap_inference(self.config.late_context)
        .into_output(Some(diag))?;
        self.state.stage = Stage::Forecast;

        let output = align_output_to_input(&x, output, ts.as_ref())?;
        self.state.stage = Stage::Aligned;
        let truth = row_keys(&output.frame, ts.as_ref())?
            .into_iter()
            .map(|key| observed.get(&key).copied().unwrap_or(f64::NAN))
            .collect();
        Ok(RollingEvaluation {
            predictions: output.predictions,
            actuals: truth,
            frame: output.frame,
        })
    }
}

/// Series of a frame that the transformer keeps.
fn forecastable_series(frame: &Frame, ts: &dyn TimeSeriesTransformer) -> Result<BTreeSet<GrainKey>> {
    if frame.is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(row_keys(frame, ts)?
        .into_iter()
        .map(|(grain, _)| grain)
        .filter(|grain| !is_grain_dropped(ts, grain))
        .collect())
}
