//! Missing-value imputers for features and targets.

use crate::core::{Column, Frame, GrainKey};
use crate::error::Result;
use crate::pipeline::{Featurizer, ShortSeriesDropper, TargetImputer};
use std::collections::{BTreeMap, BTreeSet};

/// Replace `NaN` values by carrying the last valid value forward.
///
/// Leading `NaN` values take `seed`.
pub fn fill_forward(values: &mut [f64], seed: f64) {
    let mut last = seed;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
}

/// Replace `NaN` values by the next valid value; trailing `NaN` stay.
pub fn backfill(values: &mut [f64]) {
    let mut next = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }
}

/// Fills missing numeric feature values with training means.
#[derive(Debug, Clone, Default)]
pub struct MeanImputer {
    fill_values: BTreeMap<String, f64>,
}

impl MeanImputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill(mut self, column: impl Into<String>, value: f64) -> Self {
        self.fill_values.insert(column.into(), value);
        self
    }

    pub fn fill_value(&self, column: &str) -> Option<f64> {
        self.fill_values.get(column).copied()
    }
}

impl Featurizer for MeanImputer {
    fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut out = frame.clone();
        for (name, &fill) in &self.fill_values {
            if !frame.column(name).is_some_and(Column::is_numeric) {
                continue;
            }
            let mut values = frame.floats(name)?;
            values.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = fill);
            out.set_column(name.as_str(), Column::Float(values))?;
        }
        Ok(out)
    }
}

/// Per-series target imputer carrying the last known value forward.
#[derive(Debug, Clone)]
pub struct LastValueImputer {
    target_column: String,
    fallback: f64,
}

impl LastValueImputer {
    /// `fallback` fills leading gaps, typically the last training value.
    pub fn new(target_column: impl Into<String>, fallback: f64) -> Self {
        Self {
            target_column: target_column.into(),
            fallback,
        }
    }
}

impl TargetImputer for LastValueImputer {
    fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut values = frame.floats(&self.target_column)?;
        fill_forward(&mut values, self.fallback);
        let mut out = frame.clone();
        out.set_column(self.target_column.as_str(), Column::Float(values))?;
        Ok(out)
    }
}

/// Keeps the series that were long enough in training.
#[derive(Debug, Clone, Default)]
pub struct GrainDropper {
    keep: BTreeSet<GrainKey>,
}

impl GrainDropper {
    pub fn new(keep: impl IntoIterator<Item = GrainKey>) -> Self {
        Self {
            keep: keep.into_iter().collect(),
        }
    }
}

impl ShortSeriesDropper for GrainDropper {
    fn grains_to_keep(&self) -> &BTreeSet<GrainKey> {
        &self.keep
    }
}
