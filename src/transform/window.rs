//! Lookback window functions over time-indexed target values.

use crate::core::Frequency;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Value `k` steps before `origin` (lag 1 is the origin itself).
pub fn lag_at(
    known: &BTreeMap<DateTime<Utc>, f64>,
    freq: &Frequency,
    origin: DateTime<Utc>,
    lag: usize,
) -> f64 {
    let t = freq.advance(origin, 1 - lag as i64);
    known.get(&t).copied().unwrap_or(f64::NAN)
}

/// Mean of the `window` grid values ending at `origin`, skipping absent ones.
pub fn window_mean_at(
    known: &BTreeMap<DateTime<Utc>, f64>,
    freq: &Frequency,
    origin: DateTime<Utc>,
    window: usize,
) -> f64 {
    let values: Vec<f64> = (0..window as i64)
        .filter_map(|j| known.get(&freq.advance(origin, -j)).copied())
        .collect();
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
