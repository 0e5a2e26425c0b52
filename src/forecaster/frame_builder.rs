//! Construction of the prediction frame from features or a destination.

use crate::core::{repeat_value, Column, Frame, GrainKey, DUMMY_GRAIN_COLUMN};
use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
use crate::forecaster::diagnostics::Diagnostics;
use crate::forecaster::validation::NormalizedTarget;
use crate::pipeline::TimeSeriesTransformer;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Frame with time, grain, feature and target columns, plus the first
/// requested time of every series.
#[derive(Debug, Clone)]
pub(crate) struct PredictionFrame {
    pub frame: Frame,
    pub forecast_origin: BTreeMap<GrainKey, DateTime<Utc>>,
}

/// Add the sentinel grain column to single-series input that lacks it.
pub(crate) fn ensure_dummy_grain(frame: &mut Frame, ts: &dyn TimeSeriesTransformer) -> Result<()> {
    let grains = ts.grain_column_names();
    if grains.len() == 1 && grains[0] == DUMMY_GRAIN_COLUMN && !frame.has_column(DUMMY_GRAIN_COLUMN) {
        let len = frame.len();
        frame.set_column(
            DUMMY_GRAIN_COLUMN,
            Column::Text(vec![Some(DUMMY_GRAIN_COLUMN.to_string()); len]),
        )?;
    }
    Ok(())
}

/// Whether a column is part of the index or the target rather than a feature.
pub(crate) fn is_special_column(name: &str, ts: &dyn TimeSeriesTransformer) -> bool {
    name == ts.time_column_name()
        || name == ts.target_column_name()
        || ts.grain_column_names().iter().any(|g| g == name)
        || ts.origin_column_name() == Some(name)
        || ts.horizon_column_name() == Some(name)
        || ts.missing_target_marker() == Some(name)
}

/// Known targets as one value per row of `x`.
///
/// A target table holding the time column (and every non-sentinel grain
/// column) is joined on series and time; other tables are matched by
/// position.
pub(crate) fn resolve_target(
    x: &Frame,
    y: Option<&NormalizedTarget>,
    ts: &dyn TimeSeriesTransformer,
) -> Result<Vec<f64>> {
    let target = ts.target_column_name();
    match y {
        None => Ok(vec![f64::NAN; x.len()]),
        Some(NormalizedTarget::Values(values)) => Ok(values.clone()),
        Some(NormalizedTarget::Table(table)) => {
            let values = table.floats(target)?;
            let keyed = table.has_column(ts.time_column_name())
                && ts
                    .grain_column_names()
                    .iter()
                    .all(|g| g == DUMMY_GRAIN_COLUMN || table.has_column(g));
            if !keyed {
                if values.len() != x.len() {
                    return Err(ForecastError::config(
                        ReferenceCode::TargetSizeMismatch,
                        format!(
                            "y_future has {} rows but X_future has {} rows",
                            values.len(),
                            x.len()
                        ),
                    ));
                }
                return Ok(values);
            }

            let mut table = table.clone();
            ensure_dummy_grain(&mut table, ts)?;
            let table_keys = table.grain_keys(ts.grain_column_names())?;
            let table_times = table.times(ts.time_column_name())?;
            let lookup: HashMap<(GrainKey, DateTime<Utc>), f64> = table_keys
                .into_iter()
                .zip(table_times)
                .zip(values)
                .collect();

            let x_keys = x.grain_keys(ts.grain_column_names())?;
            let x_times = x.times(ts.time_column_name())?;
            Ok(x_keys
                .into_iter()
                .zip(x_times)
                .map(|slot| lookup.get(&slot).copied().unwrap_or(f64::NAN))
                .collect())
        }
    }
}

/// Build the prediction frame from user features and optional known targets.
pub(crate) fn from_features(
    mut x: Frame,
    y: Option<&NormalizedTarget>,
    ts: &dyn TimeSeriesTransformer,
    diag: &mut Diagnostics,
) -> Result<PredictionFrame> {
    ensure_dummy_grain(&mut x, ts)?;
    let grains = ts.grain_column_names();
    let times = x.times(ts.time_column_name())?;

    let mut forecast_origin: BTreeMap<GrainKey, DateTime<Utc>> = BTreeMap::new();
    for (key, t) in x.grain_keys(grains)?.into_iter().zip(&times) {
        forecast_origin
            .entry(key)
            .and_modify(|o| *o = (*o).min(*t))
            .or_insert(*t);
    }

    if !x.is_empty() {
        let all_null = x
            .columns()
            .find(|(name, column)| {
                !is_special_column(name, ts) && column.is_numeric() && column.is_all_null()
            })
            .map(|(name, _)| name.to_string());
        if let Some(column) = all_null {
            diag.warn_or_raise(DataErrorKind::AllNullColumn { column })?;
        }
    }

    let target = resolve_target(&x, y, ts)?;
    x.set_column(ts.target_column_name(), Column::Float(target))?;

    let len = x.len();
    for feature in ts.feature_columns() {
        if !x.has_column(feature) {
            x.set_column(feature.as_str(), Column::Float(vec![f64::NAN; len]))?;
        }
    }

    Ok(PredictionFrame {
        frame: x,
        forecast_origin,
    })
}

/// Build a frame covering every grid step from each series' last training
/// date up to `destination`, with features and target unknown.
pub(crate) fn from_destination(
    destination: DateTime<Utc>,
    ts: &dyn TimeSeriesTransformer,
) -> Result<PredictionFrame> {
    let last_dates = ts.last_training_dates();
    if last_dates.is_empty() {
        return Err(ForecastError::data(DataErrorKind::NoLastDate));
    }
    let freq = ts.freq();
    let grains = ts.grain_column_names();

    let mut parts = Vec::with_capacity(last_dates.len());
    let mut forecast_origin = BTreeMap::new();
    for (grain, &last) in last_dates {
        if destination <= last {
            return Err(ForecastError::data(DataErrorKind::EarlyDestination));
        }
        let start = freq.advance(last, 1);
        let times = freq.range(start, destination);
        let n = times.len();

        let mut part = Frame::new().with_column(
            ts.time_column_name(),
            Column::Time(times.into_iter().map(Some).collect()),
        )?;
        for (name, value) in grains.iter().zip(grain.values()) {
            part.set_column(name.as_str(), repeat_value(value, n))?;
        }
        for feature in ts.feature_columns() {
            part.set_column(feature.as_str(), Column::Float(vec![f64::NAN; n]))?;
        }
        part.set_column(ts.target_column_name(), Column::Float(vec![f64::NAN; n]))?;
        parts.push(part);
        forecast_origin.insert(grain.clone(), start);
    }

    Ok(PredictionFrame {
        frame: Frame::concat(&parts)?,
        forecast_origin,
    })
}
