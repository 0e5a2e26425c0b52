//! Direct multi-horizon lag featurizer.
//!
//! For each row the featurizer picks the latest time with a known target
//! strictly before the row (the row's origin) and encodes the target lags
//! and the trailing window mean as of that origin, together with the horizon
//! (grid steps from origin to row). Known targets come from the training
//! tail and from the non-null targets of the frame being transformed.

use crate::core::{Column, Frame, Frequency, GrainKey, GrainType, DUMMY_GRAIN_COLUMN};
use crate::error::Result;
use crate::pipeline::{
    AggregationFunction, Featurizer, ShortSeriesDropper, TargetImputer, TimeSeriesTransformer,
};
use crate::transform::impute::{GrainDropper, LastValueImputer, MeanImputer};
use crate::transform::window::{lag_at, window_mean_at};
use crate::utils::stats::{last_valid, nan_mean};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Training tail of one series.
#[derive(Debug, Clone)]
struct SeriesHistory {
    /// Target values ending at the last training date.
    tail: Vec<f64>,
}

/// Reference time-series transformer producing lag, window and horizon
/// features from already-trained state.
#[derive(Debug, Clone)]
pub struct LagTransformer {
    time_column: String,
    grain_columns: Vec<String>,
    grain_types: Vec<GrainType>,
    target_column: String,
    feature_columns: Vec<String>,
    freq: Frequency,
    max_horizon: usize,
    target_lags: Vec<usize>,
    rolling_window: usize,
    residual_stddev: Vec<f64>,
    last_training_dates: BTreeMap<GrainKey, DateTime<Utc>>,
    history: BTreeMap<GrainKey, SeriesHistory>,
    y_imputers: BTreeMap<GrainKey, LastValueImputer>,
    numeric_imputer: MeanImputer,
    horizon_column: Option<String>,
    origin_column: Option<String>,
    marker_column: Option<String>,
    dropper: Option<GrainDropper>,
    aggregation: Option<AggregationFunction>,
}

impl LagTransformer {
    /// Single-series transformer with horizon 1 and no lookback features.
    pub fn new(time_column: impl Into<String>, target_column: impl Into<String>, freq: Frequency) -> Self {
        Self {
            time_column: time_column.into(),
            grain_columns: vec![DUMMY_GRAIN_COLUMN.to_string()],
            grain_types: vec![GrainType::Text],
            target_column: target_column.into(),
            feature_columns: Vec::new(),
            freq,
            max_horizon: 1,
            target_lags: Vec::new(),
            rolling_window: 0,
            residual_stddev: Vec::new(),
            last_training_dates: BTreeMap::new(),
            history: BTreeMap::new(),
            y_imputers: BTreeMap::new(),
            numeric_imputer: MeanImputer::new(),
            horizon_column: None,
            origin_column: None,
            marker_column: None,
            dropper: None,
            aggregation: None,
        }
    }

    pub fn with_grain_columns(mut self, names: Vec<String>, types: Vec<GrainType>) -> Self {
        self.grain_columns = names;
        self.grain_types = types;
        self
    }

    /// Raw numeric features with their training means.
    pub fn with_feature(mut self, name: impl Into<String>, mean: f64) -> Self {
        let name = name.into();
        self.numeric_imputer = self.numeric_imputer.with_fill(name.clone(), mean);
        self.feature_columns.push(name);
        self
    }

    pub fn with_max_horizon(mut self, max_horizon: usize) -> Self {
        self.max_horizon = max_horizon;
        self
    }

    pub fn with_lags(mut self, lags: Vec<usize>) -> Self {
        self.target_lags = lags;
        self
    }

    pub fn with_rolling_window(mut self, window: usize) -> Self {
        self.rolling_window = window;
        self
    }

    pub fn with_residual_stddev(mut self, stddev: Vec<f64>) -> Self {
        self.residual_stddev = stddev;
        self
    }

    /// Register a trained series: its last training date and target tail.
    ///
    /// The series' target imputer carries the last tail value forward.
    pub fn with_history(mut self, grain: GrainKey, last_date: DateTime<Utc>, tail: Vec<f64>) -> Self {
        let last_value = last_valid(&tail).unwrap_or(0.0);
        self.y_imputers.insert(
            grain.clone(),
            LastValueImputer::new(self.target_column.clone(), last_value),
        );
        self.last_training_dates.insert(grain.clone(), last_date);
        self.history.insert(grain, SeriesHistory { tail });
        self
    }

    /// Remove the per-series target imputer of a series.
    pub fn without_y_imputer(mut self, grain: &GrainKey) -> Self {
        self.y_imputers.remove(grain);
        self
    }

    pub fn with_horizon_column(mut self, name: impl Into<String>) -> Self {
        self.horizon_column = Some(name.into());
        self
    }

    pub fn with_origin_column(mut self, name: impl Into<String>) -> Self {
        self.origin_column = Some(name.into());
        self
    }

    pub fn with_missing_target_marker(mut self, name: impl Into<String>) -> Self {
        self.marker_column = Some(name.into());
        self
    }

    pub fn with_short_series_dropper(mut self, dropper: GrainDropper) -> Self {
        self.dropper = Some(dropper);
        self
    }

    pub fn with_aggregation(mut self, function: AggregationFunction) -> Self {
        self.aggregation = Some(function);
        self
    }

    /// Name of the engineered column for target lag `k`.
    pub fn lag_column_name(&self, k: usize) -> String {
        format!("{}_lag{}", self.target_column, k)
    }

    /// Name of the engineered trailing-window mean column.
    pub fn rolling_column_name(&self) -> String {
        format!("{}_rolling_mean{}", self.target_column, self.rolling_window)
    }

    /// Known target values of one series on the grid: training tail first,
    /// then the frame's non-null targets.
    fn known_values(
        &self,
        grain: &GrainKey,
        times: &[DateTime<Utc>],
        targets: &[f64],
    ) -> BTreeMap<DateTime<Utc>, f64> {
        let mut known = BTreeMap::new();
        if let (Some(history), Some(&last)) = (self.history.get(grain), self.last_training_dates.get(grain)) {
            let n = history.tail.len() as i64;
            for (i, &v) in history.tail.iter().enumerate() {
                if !v.is_nan() {
                    known.insert(self.freq.advance(last, i as i64 + 1 - n), v);
                }
            }
        }
        for (&t, &y) in times.iter().zip(targets) {
            if !y.is_nan() {
                known.insert(t, y);
            }
        }
        known
    }
}

impl TimeSeriesTransformer for LagTransformer {
    fn time_column_name(&self) -> &str {
        &self.time_column
    }

    fn grain_column_names(&self) -> &[String] {
        &self.grain_columns
    }

    fn grain_column_types(&self) -> &[GrainType] {
        &self.grain_types
    }

    fn target_column_name(&self) -> &str {
        &self.target_column
    }

    fn origin_column_name(&self) -> Option<&str> {
        self.origin_column.as_deref()
    }

    fn horizon_column_name(&self) -> Option<&str> {
        self.horizon_column.as_deref()
    }

    fn missing_target_marker(&self) -> Option<&str> {
        self.marker_column.as_deref()
    }

    fn freq(&self) -> Frequency {
        self.freq
    }

    fn last_training_dates(&self) -> &BTreeMap<GrainKey, DateTime<Utc>> {
        &self.last_training_dates
    }

    fn max_horizon(&self) -> usize {
        self.max_horizon
    }

    fn target_lags(&self) -> &[usize] {
        &self.target_lags
    }

    fn rolling_window_size(&self) -> usize {
        self.rolling_window
    }

    fn residual_stddev(&self) -> &[f64] {
        &self.residual_stddev
    }

    fn y_imputer(&self, grain: &GrainKey) -> Option<&dyn TargetImputer> {
        self.y_imputers.get(grain).map(|i| i as &dyn TargetImputer)
    }

    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn numeric_imputer(&self) -> &dyn Featurizer {
        &self.numeric_imputer
    }

    fn short_series_dropper(&self) -> Option<&dyn ShortSeriesDropper> {
        self.dropper.as_ref().map(|d| d as &dyn ShortSeriesDropper)
    }

    fn target_aggregation(&self) -> Option<AggregationFunction> {
        self.aggregation
    }

    fn transform(&self, frame: &Frame) -> Result<Frame> {
        let groups = frame.group_by_grain(&self.grain_columns)?;
        let times = frame.times(&self.time_column)?;
        let targets = frame.floats(&self.target_column)?;

        let mut rows: Vec<usize> = Vec::with_capacity(frame.len());
        let mut origins: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(frame.len());
        let mut horizons: Vec<f64> = Vec::with_capacity(frame.len());
        let mut lags: Vec<Vec<f64>> = vec![Vec::with_capacity(frame.len()); self.target_lags.len()];
        let mut window_means: Vec<f64> = Vec::with_capacity(frame.len());

        for (grain, members) in &groups {
            if let Some(dropper) = &self.dropper {
                if !dropper.grains_to_keep().contains(grain) {
                    continue;
                }
            }
            let mut members = members.clone();
            members.sort_by_key(|&i| times[i]);
            let series_times: Vec<DateTime<Utc>> = members.iter().map(|&i| times[i]).collect();
            let series_targets: Vec<f64> = members.iter().map(|&i| targets[i]).collect();
            let known = self.known_values(grain, &series_times, &series_targets);
            let fallback = nan_mean(&known.values().copied().collect::<Vec<_>>());
            let fallback = if fallback.is_nan() { 0.0 } else { fallback };

            for &row in &members {
                let t = times[row];
                let origin = known.range(..t).next_back().map(|(&o, _)| o);
                let horizon = match (origin, self.last_training_dates.get(grain)) {
                    (Some(o), _) => self.freq.steps_between(o, t),
                    (None, Some(&last)) => self.freq.steps_between(last, t),
                    (None, None) => 1,
                };
                for (slot, &k) in lags.iter_mut().zip(&self.target_lags) {
                    let v = origin.map_or(f64::NAN, |o| lag_at(&known, &self.freq, o, k));
                    slot.push(if v.is_nan() { fallback } else { v });
                }
                if self.rolling_window > 0 {
                    let v = origin.map_or(f64::NAN, |o| {
                        window_mean_at(&known, &self.freq, o, self.rolling_window)
                    });
                    window_means.push(if v.is_nan() { fallback } else { v });
                }
                rows.push(row);
                origins.push(origin);
                horizons.push(horizon.max(1) as f64);
            }
        }

        let selected = frame.take(&rows);
        let mut out = Frame::new().with_column(
            self.time_column.as_str(),
            selected.require(&self.time_column)?.clone(),
        )?;
        for grain_col in &self.grain_columns {
            out.set_column(grain_col.as_str(), selected.require(grain_col)?.clone())?;
        }
        if let Some(origin_col) = &self.origin_column {
            out.set_column(origin_col.as_str(), Column::Time(origins))?;
        }

        let imputed = self.numeric_imputer.transform(&selected)?;
        for feature in &self.feature_columns {
            let values = imputed.floats(feature)?;
            out.set_column(feature.as_str(), Column::Float(values))?;
        }
        for (values, &k) in lags.into_iter().zip(&self.target_lags) {
            out.set_column(self.lag_column_name(k), Column::Float(values))?;
        }
        if self.rolling_window > 0 {
            out.set_column(self.rolling_column_name(), Column::Float(window_means))?;
        }
        if let Some(horizon_col) = &self.horizon_column {
            out.set_column(horizon_col.as_str(), Column::Float(horizons))?;
        }
        if let Some(marker) = &self.marker_column {
            let flags = match selected.column(marker) {
                Some(c) => c.to_floats().unwrap_or_else(|| vec![0.0; selected.len()]),
                None => vec![0.0; selected.len()],
            };
            let flags = flags.into_iter().map(|f| if f.is_nan() { 0.0 } else { f }).collect();
            out.set_column(marker.as_str(), Column::Float(flags))?;
        }
        out.set_column(
            self.target_column.as_str(),
            selected.require(&self.target_column)?.clone(),
        )?;
        Ok(out)
    }
}
