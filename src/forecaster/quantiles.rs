//! Normal-approximation prediction quantiles around point forecasts.
//!
//! The deviation of a row is the residual deviation of its horizon, grown
//! with the number of max-horizon rollings between the last training date
//! and the row, and zero where the target was already known.

use crate::core::{Column, ForecastOutput, Frame, GrainKey, DUMMY_GRAIN_COLUMN};
use crate::error::{ForecastError, Result};
use crate::forecaster::engine::row_keys;
use crate::pipeline::TimeSeriesTransformer;
use crate::utils::stats::quantile_normal;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Offset of quantile `q` from the point forecast for deviation `sigma`.
///
/// The median is always the point forecast, even for an unknown deviation.
pub(crate) fn quantile_offset(q: f64, sigma: f64) -> f64 {
    if q == 0.5 {
        0.0
    } else {
        quantile_normal(q) * sigma
    }
}

/// 1-based horizon from a horizon column value; missing values count as 1.
fn horizon_step(value: f64) -> Result<usize> {
    if value.is_nan() {
        return Ok(1);
    }
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(ForecastError::InvalidParameter(format!(
            "horizon column value {value} is not a positive integer"
        )));
    }
    Ok(value as usize)
}

/// Horizon (1-based) and rolling count `m` of one output row.
fn horizon_and_rollings(
    horizon_value: Option<f64>,
    steps_from_training: Option<i64>,
    max_horizon: usize,
    recursive: bool,
) -> Result<(usize, usize)> {
    let h = horizon_value.map(horizon_step).transpose()?;
    let Some(steps) = steps_from_training else {
        return Ok((h.unwrap_or(1), 1));
    };
    let steps = steps.max(1) as usize;
    Ok(match h {
        Some(h) => {
            let m = if recursive {
                steps.div_ceil(max_horizon.max(1))
            } else {
                1
            };
            (h, m)
        }
        None => (1, steps),
    })
}

/// Deviation of every output row.
pub(crate) fn row_deviations(
    output: &ForecastOutput,
    last_known: &BTreeMap<GrainKey, Option<DateTime<Utc>>>,
    recursive: bool,
    ts: &dyn TimeSeriesTransformer,
    grow: &dyn Fn(f64, usize, usize) -> f64,
) -> Result<Vec<f64>> {
    if output.frame.is_empty() {
        return Ok(Vec::new());
    }
    let stddev = ts.residual_stddev();
    let freq = ts.freq();
    let horizons = match ts.horizon_column_name() {
        Some(name) if output.frame.has_column(name) => Some(output.frame.floats(name)?),
        _ => None,
    };

    row_keys(&output.frame, ts)?
        .into_iter()
        .enumerate()
        .map(|(row, (grain, t))| {
            let steps = ts
                .last_training_dates()
                .get(&grain)
                .map(|&end| freq.steps_between(end, t));
            let (h, m) = horizon_and_rollings(
                horizons.as_ref().map(|v| v[row]),
                steps,
                ts.max_horizon(),
                recursive,
            )?;
            let base = match h.checked_sub(1).and_then(|i| stddev.get(i)) {
                Some(&sd) => sd,
                None => return Ok(f64::NAN),
            };
            if base.is_nan() {
                return Ok(f64::NAN);
            }
            let unknown = match last_known.get(&grain) {
                Some(Some(known)) => t > *known,
                _ => true,
            };
            Ok(if unknown { grow(base, h, m) } else { 0.0 })
        })
        .collect()
}

/// Frame of time, grain and one column per quantile, named by the
/// quantile value.
pub(crate) fn quantile_frame(
    output: &ForecastOutput,
    deviations: &[f64],
    quantiles: &[f64],
    ts: &dyn TimeSeriesTransformer,
) -> Result<Frame> {
    let mut frame = Frame::new();
    if let Some(time) = output.frame.column(ts.time_column_name()) {
        frame.set_column(ts.time_column_name(), time.clone())?;
    }
    for grain in ts.grain_column_names() {
        if grain == DUMMY_GRAIN_COLUMN {
            continue;
        }
        if let Some(column) = output.frame.column(grain) {
            frame.set_column(grain.as_str(), column.clone())?;
        }
    }
    for &q in quantiles {
        let values = output
            .predictions
            .iter()
            .zip(deviations)
            .map(|(&p, &sigma)| p + quantile_offset(q, sigma))
            .collect();
        frame.set_column(q.to_string(), Column::Float(values))?;
    }
    Ok(frame)
}
