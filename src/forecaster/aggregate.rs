//! Pre-aggregation of prediction input onto the trained frequency.
//!
//! Only runs when the transformer was trained with a target aggregation
//! function and the input either carries a different column set or holds
//! duplicated or off-grid timestamps.

use crate::core::{Column, Frame};
use crate::error::{DataErrorKind, ForecastError, Result};
use crate::forecaster::frame_builder::{ensure_dummy_grain, is_special_column, resolve_target};
use crate::forecaster::validation::NormalizedTarget;
use crate::pipeline::{AggregationFunction, TimeSeriesTransformer};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

fn needs_aggregation(x: &Frame, ts: &dyn TimeSeriesTransformer) -> Result<bool> {
    let present: BTreeSet<&str> = x
        .names()
        .iter()
        .map(String::as_str)
        .filter(|name| !is_special_column(name, ts))
        .collect();
    let expected: BTreeSet<&str> = ts.feature_columns().iter().map(String::as_str).collect();
    if present != expected {
        return Ok(true);
    }

    let freq = ts.freq();
    let times = x.times(ts.time_column_name())?;
    for (grain, rows) in x.group_by_grain(ts.grain_column_names())? {
        let Some(&first) = rows.first() else {
            continue;
        };
        let anchor = ts
            .last_training_dates()
            .get(&grain)
            .copied()
            .unwrap_or(times[first]);
        let mut seen = HashSet::with_capacity(rows.len());
        for &row in &rows {
            if !seen.insert(times[row]) || !freq.is_on_grid(anchor, times[row]) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Pick, per bucket, the first row with a value in `column`.
fn first_present(column: &Column, buckets: &[Vec<usize>]) -> Column {
    let picks: Vec<usize> = buckets
        .iter()
        .map(|rows| {
            rows.iter()
                .copied()
                .find(|&r| !column.is_null(r))
                .unwrap_or(rows[0])
        })
        .collect();
    column.take(&picks)
}

fn aggregate_column(values: &[f64], buckets: &[Vec<usize>], function: AggregationFunction) -> Vec<f64> {
    buckets
        .iter()
        .map(|rows| {
            let members: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
            function.apply(&members)
        })
        .collect()
}

/// Aggregate `x` (and the known targets) onto the trained grid.
///
/// Returns the input unchanged when no aggregation is configured or needed.
/// Otherwise the targets come back as one value per aggregated row.
pub(crate) fn preaggregate(
    mut x: Frame,
    y: Option<NormalizedTarget>,
    ts: &dyn TimeSeriesTransformer,
) -> Result<(Frame, Option<NormalizedTarget>)> {
    let Some(function) = ts.target_aggregation() else {
        return Ok((x, y));
    };
    ensure_dummy_grain(&mut x, ts)?;
    if !x.is_empty() && !needs_aggregation(&x, ts)? {
        return Ok((x, y));
    }

    let target = resolve_target(&x, y.as_ref(), ts)?;
    let freq = ts.freq();
    let time_col = ts.time_column_name();
    let times = x.times(time_col)?;

    // Buckets in series key order, times ascending within a series.
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    let mut bucket_times: Vec<DateTime<Utc>> = Vec::new();
    for (grain, rows) in x.group_by_grain(ts.grain_column_names())? {
        let Some(&first) = rows.first() else {
            continue;
        };
        let anchor = ts
            .last_training_dates()
            .get(&grain)
            .copied()
            .unwrap_or_else(|| rows.iter().map(|&r| times[r]).min().unwrap_or(times[first]));
        let mut by_time: BTreeMap<DateTime<Utc>, Vec<usize>> = BTreeMap::new();
        for &row in &rows {
            by_time
                .entry(freq.floor_to_grid(anchor, times[row]))
                .or_default()
                .push(row);
        }
        for (t, members) in by_time {
            bucket_times.push(t);
            buckets.push(members);
        }
    }
    if buckets.is_empty() {
        return Err(ForecastError::data(DataErrorKind::EmptyAfterAggregation));
    }

    let grains = ts.grain_column_names();
    let mut out = Frame::new();
    for (name, column) in x.columns() {
        let aggregated = if name == time_col {
            Column::Time(bucket_times.iter().copied().map(Some).collect())
        } else if column.is_numeric() && !grains.iter().any(|g| g == name) {
            let values = x.floats(name)?;
            Column::Float(aggregate_column(&values, &buckets, function))
        } else {
            first_present(column, &buckets)
        };
        out.set_column(name, aggregated)?;
    }

    tracing::debug!(
        rows_in = x.len(),
        rows_out = out.len(),
        "aggregated prediction input onto the trained frequency"
    );
    let y = y.map(|_| NormalizedTarget::Values(aggregate_column(&target, &buckets, function)));
    Ok((out, y))
}
