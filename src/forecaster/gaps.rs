//! Gap inference between training data and the prediction frame.
//!
//! Finds the last known target of each series, checks the known region,
//! and synthesizes imputed rows between the training end and the first
//! requested time when lookback features need them.

use crate::config::LateContextPolicy;
use crate::core::{repeat_value, Column, Frame, GrainKey};
use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
use crate::forecaster::diagnostics::Diagnostics;
use crate::pipeline::{ShortSeriesPolicy, TimeSeriesTransformer};
use crate::transform::impute::backfill;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Gap-filled frame and the last known target time of every series.
#[derive(Debug, Clone)]
pub(crate) struct GapFillResult {
    pub frame: Frame,
    pub last_known: BTreeMap<GrainKey, Option<DateTime<Utc>>>,
}

/// Whether the transformer will drop `grain` at transform time.
pub(crate) fn is_grain_dropped(ts: &dyn TimeSeriesTransformer, grain: &GrainKey) -> bool {
    if ts.short_series_policy() != ShortSeriesPolicy::Drop {
        return false;
    }
    !ts.last_training_dates().contains_key(grain)
        || ts
            .short_series_dropper()
            .is_some_and(|d| !d.grains_to_keep().contains(grain))
}

/// Last known target time of one series sorted by time.
///
/// Returns `None` when no target is known, together with the targets after
/// applying `policy`. With `silent`, the known-region rules are not checked.
pub(crate) fn last_known_target(
    times: &[DateTime<Utc>],
    mut y: Vec<f64>,
    silent: bool,
    diag: &mut Diagnostics,
    policy: LateContextPolicy,
) -> Result<(Option<DateTime<Utc>>, Vec<f64>)> {
    if policy == LateContextPolicy::IgnoreLateValues {
        if let Some(first_unknown) = y.iter().position(|v| v.is_nan()) {
            y[first_unknown..].iter_mut().for_each(|v| *v = f64::NAN);
        }
    }

    let known: Vec<usize> = y
        .iter()
        .enumerate()
        .filter_map(|(i, v)| (!v.is_nan()).then_some(i))
        .collect();
    if known.len() == y.len() {
        if !silent {
            diag.warn_or_raise(DataErrorKind::NothingToPredict)?;
        }
        return Ok((times.last().copied(), y));
    }
    let Some(&last) = known.last() else {
        return Ok((None, y));
    };

    if !silent {
        if known.last() == Some(&(y.len() - 1)) {
            diag.warn_or_raise(DataErrorKind::ContextAtEndOfY)?;
        }
        if known.windows(2).any(|w| w[1] != w[0] + 1) {
            diag.warn_or_raise(DataErrorKind::NonContiguousY)?;
        }
    }
    Ok((Some(times[last]), y))
}

/// Imputed rows from `start` up to the step before `first_time`.
fn gap_extension(
    series: &Frame,
    grain: &GrainKey,
    start: DateTime<Utc>,
    first_time: DateTime<Utc>,
    ts: &dyn TimeSeriesTransformer,
) -> Result<Frame> {
    let freq = ts.freq();
    let mut dates = freq.range(start, freq.advance(first_time, -1));
    if dates.is_empty() {
        dates.push(start);
    }
    let n = dates.len();

    let mut extension = Frame::new();
    for (name, column) in series.columns() {
        extension.set_column(name, column.nulls(n))?;
    }
    extension.set_column(
        ts.time_column_name(),
        Column::Time(dates.into_iter().map(Some).collect()),
    )?;
    for (name, value) in ts.grain_column_names().iter().zip(grain.values()) {
        extension.set_column(name.as_str(), repeat_value(value, n))?;
    }
    if let Some(marker) = ts.missing_target_marker() {
        extension.set_column(marker, Column::Float(vec![1.0; n]))?;
    }

    let extension = ts.numeric_imputer().transform(&extension)?;
    let imputer = ts.y_imputer(grain).ok_or_else(|| {
        ForecastError::untrained(
            ReferenceCode::NoTargetImputer,
            format!("no target imputer is available for time series {grain}"),
        )
    })?;
    let extension = imputer.transform(&extension)?;
    tracing::debug!(grain = %grain, rows = n, "synthesized rows between training and prediction data");
    Ok(extension)
}

/// Infer the rows lookback features need and fill unknown context targets.
///
/// `silent` suppresses the known-region checks; they are still applied
/// to the targets. Series are returned in key order, sorted by time.
pub(crate) fn infer_missing_data(
    frame: &Frame,
    ts: &dyn TimeSeriesTransformer,
    policy: LateContextPolicy,
    diag: &mut Diagnostics,
    silent: bool,
) -> Result<GapFillResult> {
    let time_col = ts.time_column_name();
    let target_col = ts.target_column_name();
    let freq = ts.freq();
    let lookback = ts
        .target_lags()
        .iter()
        .copied()
        .chain([ts.rolling_window_size(), ts.max_horizon()])
        .max()
        .unwrap_or(0) as i64;
    let lookback_aware = ts.is_lookback_aware();
    let drops_short_series = ts.short_series_policy() == ShortSeriesPolicy::Drop;

    let times = frame.times(time_col)?;
    let mut parts = Vec::new();
    let mut last_known = BTreeMap::new();

    for (grain, mut rows) in frame.group_by_grain(ts.grain_column_names())? {
        rows.sort_by_key(|&r| times[r]);
        let series_times: Vec<DateTime<Utc>> = rows.iter().map(|&r| times[r]).collect();
        let Some(&first_time) = series_times.first() else {
            continue;
        };
        let mut series = frame.take(&rows);
        let training_end = ts.last_training_dates().get(&grain).copied();
        let absent = drops_short_series && training_end.is_none();

        let (known_until, y) = last_known_target(
            &series_times,
            series.floats(target_col)?,
            silent || absent,
            diag,
            policy,
        )?;
        let first_unknown = known_until.map_or(first_time, |t| freq.advance(t, 1));
        let expected_start = match training_end {
            Some(end) => freq.advance(end, 1).max(freq.advance(first_unknown, -lookback)),
            None => first_time,
        };
        let has_gap = first_time > expected_start;

        if has_gap && lookback_aware && y.iter().all(|v| v.is_nan()) && !is_grain_dropped(ts, &grain) {
            diag.warn_once_or_raise(DataErrorKind::NoDataContext)?;
        }

        match training_end {
            None if !drops_short_series => {
                return Err(ForecastError::data(DataErrorKind::AbsentGrain {
                    grain: grain.to_string(),
                }))
            }
            Some(end) if first_time <= end => {
                return Err(ForecastError::data_at(
                    DataErrorKind::EarlyDestination,
                    ReferenceCode::EarlyDestinationInData,
                ))
            }
            _ => {}
        }

        if let Some(marker) = ts.missing_target_marker() {
            let flags = series_times
                .iter()
                .zip(&y)
                .map(|(t, v)| match known_until {
                    Some(k) if *t <= k && v.is_nan() => 1.0,
                    _ => 0.0,
                })
                .collect();
            series.set_column(marker, Column::Float(flags))?;
        }
        series.set_column(target_col, Column::Float(y))?;

        if training_end.is_some() && has_gap && lookback_aware {
            let extension = gap_extension(&series, &grain, expected_start, first_time, ts)?;
            series = Frame::concat(&[extension, series])?;
        }

        let mut target = series.floats(target_col)?;
        backfill(&mut target);
        series.set_column(target_col, Column::Float(target))?;

        last_known.insert(grain, known_until);
        parts.push(series);
    }

    let frame = if parts.is_empty() {
        frame.clone()
    } else {
        Frame::concat(&parts)?
    };
    Ok(GapFillResult { frame, last_known })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frequency, GrainType, DUMMY_GRAIN_COLUMN};
    use crate::transform::impute::GrainDropper;
    use crate::transform::LagTransformer;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, h, 0, 0).unwrap()
    }

    fn transformer() -> LagTransformer {
        LagTransformer::new("date", "y", Frequency::hourly())
            .with_max_horizon(3)
            .with_lags(vec![1])
            .with_history(GrainKey::dummy(), at(5), vec![1.0, 2.0, 3.0])
    }

    fn frame(hours: &[u32], y: Vec<f64>) -> Frame {
        let n = hours.len();
        Frame::new()
            .with_column("date", Column::Time(hours.iter().map(|&h| Some(at(h))).collect()))
            .unwrap()
            .with_column(
                DUMMY_GRAIN_COLUMN,
                Column::Text(vec![Some(DUMMY_GRAIN_COLUMN.to_string()); n]),
            )
            .unwrap()
            .with_column("y", Column::Float(y))
            .unwrap()
    }

    fn fill(
        ts: &LagTransformer,
        frame: &Frame,
        diag: &mut Diagnostics,
    ) -> Result<GapFillResult> {
        infer_missing_data(frame, ts, LateContextPolicy::RespectLateValues, diag, false)
    }

    #[test]
    fn last_known_target_rules() {
        let times = [at(6), at(7), at(8)];
        let mut diag = Diagnostics::new(true);

        let (t, _) = last_known_target(&times, vec![f64::NAN; 3], false, &mut diag, Default::default()).unwrap();
        assert_eq!(t, None);
        assert!(diag.warnings().is_empty());

        let (t, _) = last_known_target(&times, vec![1.0, f64::NAN, f64::NAN], false, &mut diag, Default::default()).unwrap();
        assert_eq!(t, Some(at(6)));
        assert!(diag.warnings().is_empty());

        let (t, _) = last_known_target(&times, vec![1.0, 2.0, 3.0], false, &mut diag, Default::default()).unwrap();
        assert_eq!(t, Some(at(8)));
        assert_eq!(diag.warnings()[0].reference_code(), ReferenceCode::NothingToPredict);

        let mut diag = Diagnostics::new(true);
        let (t, _) = last_known_target(&times, vec![1.0, f64::NAN, 3.0], false, &mut diag, Default::default()).unwrap();
        assert_eq!(t, Some(at(8)));
        let codes: Vec<ReferenceCode> = diag.warnings().iter().map(|w| w.reference_code()).collect();
        assert_eq!(codes, vec![ReferenceCode::ContextAtEndOfY, ReferenceCode::NonContiguousY]);
    }

    #[test]
    fn silent_mode_skips_known_region_rules() {
        let times = [at(6), at(7)];
        let mut diag = Diagnostics::new(false);
        let (t, _) = last_known_target(&times, vec![1.0, 2.0], true, &mut diag, Default::default()).unwrap();
        assert_eq!(t, Some(at(7)));
    }

    #[test]
    fn ignoring_late_values_truncates_context() {
        let times = [at(6), at(7), at(8)];
        let mut diag = Diagnostics::new(false);
        let (t, y) = last_known_target(
            &times,
            vec![1.0, f64::NAN, 3.0],
            false,
            &mut diag,
            LateContextPolicy::IgnoreLateValues,
        )
        .unwrap();
        assert_eq!(t, Some(at(6)));
        assert!(y[2].is_nan());
    }

    #[test]
    fn gap_is_filled_from_training_tail() {
        let ts = transformer();
        let mut diag = Diagnostics::new(true);
        let out = fill(&ts, &frame(&[8, 9], vec![f64::NAN; 2]), &mut diag).unwrap();
        assert_eq!(out.frame.times("date").unwrap(), vec![at(6), at(7), at(8), at(9)]);
        let y = out.frame.floats("y").unwrap();
        assert_eq!(&y[..2], &[3.0, 3.0]);
        assert!(y[2].is_nan() && y[3].is_nan());
        assert_eq!(diag.warnings()[0].reference_code(), ReferenceCode::NoDataContext);
        assert_eq!(out.last_known[&GrainKey::dummy()], None);
    }

    #[test]
    fn gap_without_context_raises_by_default() {
        let ts = transformer();
        let mut diag = Diagnostics::new(false);
        let err = fill(&ts, &frame(&[8, 9], vec![f64::NAN; 2]), &mut diag).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::NoDataContext);
    }

    #[test]
    fn known_context_is_backfilled() {
        let ts = transformer();
        let mut diag = Diagnostics::new(false);
        let out = fill(&ts, &frame(&[8, 9], vec![5.0, f64::NAN]), &mut diag).unwrap();
        let y = out.frame.floats("y").unwrap();
        assert_eq!(&y[..3], &[3.0, 3.0, 5.0]);
        assert!(y[3].is_nan());
        assert_eq!(out.last_known[&GrainKey::dummy()], Some(at(8)));
    }

    #[test]
    fn contiguous_frame_is_not_extended() {
        let ts = transformer();
        let mut diag = Diagnostics::new(false);
        let out = fill(&ts, &frame(&[6, 7], vec![f64::NAN; 2]), &mut diag).unwrap();
        assert_eq!(out.frame.len(), 2);
    }

    #[test]
    fn marker_flags_imputed_context() {
        let ts = transformer().with_missing_target_marker("y_missing");
        let mut diag = Diagnostics::new(true);
        let out = fill(
            &ts,
            &frame(&[6, 7, 8, 9], vec![4.0, f64::NAN, 5.0, f64::NAN]),
            &mut diag,
        )
        .unwrap();
        assert_eq!(out.frame.floats("y_missing").unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
        let y = out.frame.floats("y").unwrap();
        assert_eq!(&y[..3], &[4.0, 5.0, 5.0]);
        assert_eq!(diag.warnings()[0].reference_code(), ReferenceCode::NonContiguousY);
    }

    #[test]
    fn early_rows_are_rejected() {
        let ts = transformer();
        let mut diag = Diagnostics::new(true);
        let err = fill(&ts, &frame(&[5, 6], vec![f64::NAN; 2]), &mut diag).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::EarlyDestinationInData);
    }

    #[test]
    fn absent_series_follow_short_series_policy() {
        let ts = LagTransformer::new("date", "y", Frequency::hourly())
            .with_grain_columns(vec!["store".to_string()], vec![GrainType::Integer])
            .with_lags(vec![1])
            .with_history(GrainKey::from(1), at(5), vec![1.0]);
        let x = Frame::new()
            .with_column("date", Column::Time(vec![Some(at(6))]))
            .unwrap()
            .with_column("store", Column::Int(vec![Some(2)]))
            .unwrap()
            .with_column("y", Column::Float(vec![f64::NAN]))
            .unwrap();

        let mut diag = Diagnostics::new(false);
        let err = fill(&ts, &x, &mut diag).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::AbsentGrain);

        let ts = ts.with_short_series_dropper(GrainDropper::new([GrainKey::from(1)]));
        assert!(is_grain_dropped(&ts, &GrainKey::from(2)));
        let out = fill(&ts, &x, &mut diag).unwrap();
        assert_eq!(out.frame.len(), 1);
    }

    #[test]
    fn missing_target_imputer_is_an_untrained_model() {
        let ts = transformer().without_y_imputer(&GrainKey::dummy());
        let mut diag = Diagnostics::new(true);
        let err = fill(&ts, &frame(&[8], vec![f64::NAN]), &mut diag).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::NoTargetImputer);
    }
}
