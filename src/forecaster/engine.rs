//! Forecasting engine: single-shot prediction, rolling-origin windows and
//! output alignment.

use crate::config::LateContextPolicy;
use crate::core::{Column, ForecastOutput, Frame, GrainKey, DUMMY_GRAIN_COLUMN};
use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
use crate::forecaster::diagnostics::Diagnostics;
use crate::forecaster::gaps::{infer_missing_data, is_grain_dropped, last_known_target};
use crate::pipeline::{Pipeline, PipelineStep, ShortSeriesPolicy, TimeSeriesTransformer};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Known or predicted target keyed by series and time.
pub(crate) type TargetMap = HashMap<(GrainKey, DateTime<Utc>), f64>;

fn index_columns(ts: &dyn TimeSeriesTransformer) -> Vec<String> {
    let mut names = vec![ts.time_column_name().to_string()];
    names.extend(ts.grain_column_names().iter().cloned());
    if let Some(origin) = ts.origin_column_name() {
        names.push(origin.to_string());
    }
    names
}

/// Series and time of every row, using the sentinel key when the frame has
/// no sentinel grain column.
pub(crate) fn row_keys(
    frame: &Frame,
    ts: &dyn TimeSeriesTransformer,
) -> Result<Vec<(GrainKey, DateTime<Utc>)>> {
    let times = frame.times(ts.time_column_name())?;
    let grains = ts.grain_column_names();
    let keys = if grains.len() == 1 && grains[0] == DUMMY_GRAIN_COLUMN && !frame.has_column(DUMMY_GRAIN_COLUMN) {
        vec![GrainKey::dummy(); frame.len()]
    } else {
        frame.grain_keys(grains)?
    };
    Ok(keys.into_iter().zip(times).collect())
}

/// Run the pipeline once over a prediction frame.
///
/// The engineered target column carries known values past the regressor;
/// rows whose target is unknown receive the prediction.
pub(crate) fn single_shot(pipeline: &Pipeline, frame: &Frame) -> Result<ForecastOutput> {
    let ts = pipeline.time_series_transformer();
    let target = ts.target_column_name();

    let mut current = frame.clone();
    let mut split: Option<(Frame, Vec<f64>)> = None;
    let mut predictions: Option<Vec<f64>> = None;
    for step in pipeline.steps() {
        match step {
            PipelineStep::TimeSeriesTransform(transformer) => {
                let mut engineered = transformer.transform(&current)?;
                let carrier = match engineered.remove_column(target) {
                    Some(column) => column.to_floats().ok_or_else(|| ForecastError::ColumnType {
                        column: target.to_string(),
                        expected: "float",
                    })?,
                    None => vec![f64::NAN; engineered.len()],
                };
                let mut index = Frame::new();
                for name in index_columns(transformer.as_ref()) {
                    if let Some(column) = engineered.remove_column(&name) {
                        index.set_column(name, column)?;
                    }
                }
                split = Some((index, carrier));
                current = engineered;
            }
            PipelineStep::Featurizer(featurizer) => {
                let next = featurizer.transform(&current)?;
                if split.is_some() && next.len() != current.len() {
                    return Err(ForecastError::DimensionMismatch {
                        expected: current.len(),
                        got: next.len(),
                    });
                }
                current = next;
            }
            PipelineStep::Regressor(regressor) => {
                let values = regressor
                    .predict(&current)
                    .map_err(|e| ForecastError::Prediction(e.to_string()))?;
                if values.len() != current.len() {
                    return Err(ForecastError::Prediction(format!(
                        "{} returned {} predictions for {} rows",
                        regressor.name(),
                        values.len(),
                        current.len()
                    )));
                }
                predictions = Some(values);
            }
        }
    }

    let (Some((index, carrier)), Some(predicted)) = (split, predictions) else {
        return Err(ForecastError::config(
            ReferenceCode::InvalidPipeline,
            "the pipeline must transform before it predicts",
        ));
    };
    let mut out = index;
    for (name, column) in current.columns() {
        out.set_column(name, column.clone())?;
    }
    let combined: Vec<f64> = carrier
        .iter()
        .zip(&predicted)
        .map(|(&known, &p)| if known.is_nan() { p } else { known })
        .collect();
    out.set_column(target, Column::Float(combined))?;

    let out = ts.select_latest_origin(&out)?;
    let predictions = out.floats(target)?;
    Ok(ForecastOutput::new(predictions, out))
}

/// Drop the rows synthesized before each series' forecast origin.
pub(crate) fn trim_to_origin(
    output: ForecastOutput,
    origins: &BTreeMap<GrainKey, DateTime<Utc>>,
    ts: &dyn TimeSeriesTransformer,
) -> Result<ForecastOutput> {
    if output.frame.is_empty() {
        return Ok(output);
    }
    let mask: Vec<bool> = row_keys(&output.frame, ts)?
        .into_iter()
        .map(|(grain, t)| origins.get(&grain).map_or(true, |&o| t >= o))
        .collect();
    let frame = output.frame.filter(&mask);
    let predictions = frame.floats(ts.target_column_name())?;
    Ok(ForecastOutput::new(predictions, frame))
}

/// Series whose requested times reach beyond the max horizon from their
/// last known target.
///
/// Series the transformer drops are ignored; a series absent from training
/// is an error unless short series are dropped.
pub(crate) fn recursion_targets(
    frame: &Frame,
    ts: &dyn TimeSeriesTransformer,
    policy: LateContextPolicy,
) -> Result<BTreeSet<GrainKey>> {
    let mut targets = BTreeSet::new();
    if !ts.is_lookback_aware() {
        return Ok(targets);
    }
    let freq = ts.freq();
    let times = frame.times(ts.time_column_name())?;
    let y = frame.floats(ts.target_column_name())?;
    let mut scratch = Diagnostics::new(true);

    for (grain, mut rows) in frame.group_by_grain(ts.grain_column_names())? {
        if is_grain_dropped(ts, &grain) {
            continue;
        }
        let Some(&training_end) = ts.last_training_dates().get(&grain) else {
            if ts.short_series_policy() == ShortSeriesPolicy::Drop {
                continue;
            }
            return Err(ForecastError::data(DataErrorKind::AbsentGrain {
                grain: grain.to_string(),
            }));
        };
        rows.sort_by_key(|&r| times[r]);
        let series_times: Vec<DateTime<Utc>> = rows.iter().map(|&r| times[r]).collect();
        let series_y: Vec<f64> = rows.iter().map(|&r| y[r]).collect();
        let Some(&last_time) = series_times.last() else {
            continue;
        };
        let (known, _) = last_known_target(&series_times, series_y, true, &mut scratch, policy)?;
        let reference = known.map_or(training_end, |k| k.max(training_end));
        if freq.steps_between(reference, last_time) > ts.max_horizon() as i64 {
            targets.insert(grain);
        }
    }
    Ok(targets)
}

/// One rolling-origin step of a recursive forecast or rolling evaluation.
#[derive(Debug, Clone)]
pub struct WindowStep {
    pub grain: GrainKey,
    /// First time forecast in this window.
    pub origin: DateTime<Utc>,
    /// Exclusive end of the window, `origin + max_horizon · freq`.
    pub horizon_time: DateTime<Utc>,
    /// Frame handed to the pipeline, with the context targets filled in.
    pub context: Frame,
    /// Forecasts for `[origin, horizon_time)`.
    pub predictions: ForecastOutput,
}

#[derive(Debug)]
struct SeriesWindows {
    grain: GrainKey,
    frame: Frame,
    times: Vec<DateTime<Utc>>,
    targets: Vec<f64>,
    actuals: Vec<f64>,
    origin: DateTime<Utc>,
    end: DateTime<Utc>,
    predicted: BTreeMap<DateTime<Utc>, f64>,
}

impl SeriesWindows {
    /// Forecast the next window. With `gaps`, the missing data before the
    /// window is inferred from this window's own origin.
    fn advance(
        &mut self,
        pipeline: &Pipeline,
        gaps: Option<(LateContextPolicy, &mut Diagnostics)>,
    ) -> Result<WindowStep> {
        let ts = pipeline.time_series_transformer();
        let horizon = ts.max_horizon().max(1) as i64;
        let horizon_time = ts.freq().advance(self.origin, horizon);

        let rows: Vec<usize> = (0..self.times.len())
            .filter(|&r| self.times[r] < horizon_time)
            .collect();
        let targets: Vec<f64> = rows
            .iter()
            .map(|&r| {
                let t = self.times[r];
                if t >= self.origin {
                    return self.targets[r];
                }
                if !self.actuals[r].is_nan() {
                    self.actuals[r]
                } else if !self.targets[r].is_nan() {
                    self.targets[r]
                } else {
                    self.predicted.get(&t).copied().unwrap_or(f64::NAN)
                }
            })
            .collect();
        let mut context = self.frame.take(&rows);
        context.set_column(ts.target_column_name(), Column::Float(targets))?;
        if let Some((policy, diag)) = gaps {
            context = infer_missing_data(&context, ts.as_ref(), policy, diag, true)?.frame;
        }

        let output = single_shot(pipeline, &context)?;
        let window_times = output.frame.times(ts.time_column_name())?;
        let mask: Vec<bool> = window_times
            .iter()
            .map(|&t| t >= self.origin && t < horizon_time)
            .collect();
        let frame = output.frame.filter(&mask);
        let predictions = frame.floats(ts.target_column_name())?;
        for (t, &p) in frame.times(ts.time_column_name())?.into_iter().zip(&predictions) {
            self.predicted.insert(t, p);
        }

        tracing::debug!(
            grain = %self.grain,
            origin = %self.origin,
            rows = predictions.len(),
            "advanced forecast window"
        );
        let step = WindowStep {
            grain: self.grain.clone(),
            origin: self.origin,
            horizon_time,
            context,
            predictions: ForecastOutput::new(predictions, frame),
        };
        self.origin = horizon_time;
        Ok(step)
    }
}

/// Lazy sequence of rolling-origin windows, series in key order.
///
/// Each window forecasts `max_horizon` steps; targets before the window
/// origin come from the ground truth when known, otherwise from earlier
/// windows. The iterator stops after the first error.
#[derive(Debug)]
pub struct ForecastWindows {
    pipeline: Pipeline,
    series: VecDeque<SeriesWindows>,
    gap_policy: Option<LateContextPolicy>,
    failed: bool,
}

impl ForecastWindows {
    /// Windows over the listed series of a gap-filled frame, starting at
    /// each series' forecast origin.
    pub(crate) fn new(
        pipeline: Pipeline,
        frame: &Frame,
        grains: &BTreeSet<GrainKey>,
        origins: &BTreeMap<GrainKey, DateTime<Utc>>,
        actuals: Option<&TargetMap>,
    ) -> Result<Self> {
        let ts = pipeline.time_series_transformer().clone();
        let mut series = VecDeque::new();
        if !frame.is_empty() {
            let times = frame.times(ts.time_column_name())?;
            for (grain, mut rows) in frame.group_by_grain(ts.grain_column_names())? {
                if !grains.contains(&grain) {
                    continue;
                }
                rows.sort_by_key(|&r| times[r]);
                let series_times: Vec<DateTime<Utc>> = rows.iter().map(|&r| times[r]).collect();
                let (Some(&first), Some(&end)) = (series_times.first(), series_times.last()) else {
                    continue;
                };
                let part = frame.take(&rows);
                let targets = part.floats(ts.target_column_name())?;
                let truth = series_times
                    .iter()
                    .map(|&t| {
                        actuals
                            .and_then(|a| a.get(&(grain.clone(), t)).copied())
                            .unwrap_or(f64::NAN)
                    })
                    .collect();
                series.push_back(SeriesWindows {
                    origin: origins.get(&grain).copied().unwrap_or(first),
                    grain,
                    frame: part,
                    times: series_times,
                    targets,
                    actuals: truth,
                    end,
                    predicted: BTreeMap::new(),
                });
            }
        }
        Ok(Self {
            pipeline,
            series,
            gap_policy: None,
            failed: false,
        })
    }

    /// Rerun gap inference on every window instead of relying on a frame
    /// that was filled once up front.
    pub(crate) fn with_gap_inference(mut self, policy: LateContextPolicy) -> Self {
        self.gap_policy = Some(policy);
        self
    }

    /// Run every window and stack the forecasts.
    ///
    /// `diag` receives the data rules of per-window gap inference.
    pub(crate) fn into_output(mut self, mut diag: Option<&mut Diagnostics>) -> Result<ForecastOutput> {
        let mut frames = Vec::new();
        let mut predictions = Vec::new();
        while let Some(step) = self.next_window(diag.as_deref_mut()) {
            let step = step?;
            predictions.extend(step.predictions.predictions);
            frames.push(step.predictions.frame);
        }
        Ok(ForecastOutput::new(predictions, Frame::concat(&frames)?))
    }

    fn next_window(&mut self, diag: Option<&mut Diagnostics>) -> Option<Result<WindowStep>> {
        if self.failed {
            return None;
        }
        while self.series.front().is_some_and(|s| s.origin > s.end) {
            self.series.pop_front();
        }
        let state = self.series.front_mut()?;
        let step = state.advance(&self.pipeline, self.gap_policy.zip(diag));
        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }
}

impl Iterator for ForecastWindows {
    type Item = Result<WindowStep>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window(None)
    }
}

/// Reorder the output to follow the input rows.
///
/// Input rows without a forecast (for example rows of dropped series) get a
/// row holding only time and grain, with a missing prediction.
pub(crate) fn align_output_to_input(
    input: &Frame,
    output: ForecastOutput,
    ts: &dyn TimeSeriesTransformer,
) -> Result<ForecastOutput> {
    let produced: HashMap<(GrainKey, DateTime<Utc>), usize> = if output.frame.is_empty() {
        HashMap::new()
    } else {
        row_keys(&output.frame, ts)?
            .into_iter()
            .enumerate()
            .map(|(row, key)| (key, row))
            .collect()
    };

    let mut order = Vec::with_capacity(input.len());
    let mut missing = Vec::new();
    for (row, key) in row_keys(input, ts)?.into_iter().enumerate() {
        match produced.get(&key) {
            Some(&i) => order.push(i),
            None => {
                order.push(output.frame.len() + missing.len());
                missing.push(row);
            }
        }
    }

    let frame = if missing.is_empty() {
        output.frame.take(&order)
    } else {
        let mut stubs = Frame::new();
        let mut names = vec![ts.time_column_name().to_string()];
        names.extend(ts.grain_column_names().iter().cloned());
        for name in names {
            if let Some(column) = input.column(&name) {
                stubs.set_column(name, column.take(&missing))?;
            }
        }
        stubs.set_column(
            ts.target_column_name(),
            Column::Float(vec![f64::NAN; missing.len()]),
        )?;
        Frame::concat(&[output.frame, stubs])?.take(&order)
    };
    let predictions = frame.floats(ts.target_column_name())?;
    Ok(ForecastOutput::new(predictions, frame))
}

/// Sort the output by time, then series.
pub(crate) fn sort_output(
    output: ForecastOutput,
    ts: &dyn TimeSeriesTransformer,
) -> Result<ForecastOutput> {
    if output.frame.is_empty() {
        return Ok(output);
    }
    let mut keys = vec![ts.time_column_name().to_string()];
    keys.extend(ts.grain_column_names().iter().cloned());
    let frame = output.frame.sort_by_keys(&keys)?;
    let predictions = frame.floats(ts.target_column_name())?;
    Ok(ForecastOutput::new(predictions, frame))
}
