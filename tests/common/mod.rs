//! Shared fixtures: an hourly single-series pipeline trained up to 05:00.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use forecast_pipeline::core::GrainType;
use forecast_pipeline::pipeline::PipelineStep;
use forecast_pipeline::prelude::*;
use std::sync::Arc;

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, hour, 0, 0).unwrap()
}

/// Max horizon 3, one target lag, a horizon column and a training tail of
/// `[1, 2, 3]` ending at 05:00.
pub fn transformer() -> LagTransformer {
    LagTransformer::new("date", "y", Frequency::hourly())
        .with_max_horizon(3)
        .with_lags(vec![1])
        .with_horizon_column("horizon")
        .with_residual_stddev(vec![1.0, 1.5, 2.0])
        .with_history(GrainKey::dummy(), at(5), vec![1.0, 2.0, 3.0])
}

/// `y_lag1 + horizon`
pub fn model() -> LinearRegressor {
    LinearRegressor::new(0.0)
        .with_coefficient("y_lag1", 1.0)
        .with_coefficient("horizon", 1.0)
}

pub fn pipeline_with(transformer: LagTransformer) -> Pipeline {
    pipeline_of(transformer, model())
}

pub fn pipeline_of(transformer: LagTransformer, model: LinearRegressor) -> Pipeline {
    Pipeline::new(vec![
        PipelineStep::TimeSeriesTransform(Arc::new(transformer)),
        PipelineStep::Regressor(Arc::new(model)),
    ])
    .unwrap()
}

pub fn forecaster() -> Forecaster {
    Forecaster::new(pipeline_with(transformer()))
}

pub fn features(hours: &[u32]) -> Frame {
    Frame::new()
        .with_column("date", Column::Time(hours.iter().map(|&h| Some(at(h))).collect()))
        .unwrap()
}

/// Two series, `a` and `b`, trained up to 05:00 with different tails.
pub fn two_series_transformer() -> LagTransformer {
    LagTransformer::new("date", "y", Frequency::hourly())
        .with_grain_columns(vec!["store".to_string()], vec![GrainType::Text])
        .with_max_horizon(3)
        .with_lags(vec![1])
        .with_horizon_column("horizon")
        .with_residual_stddev(vec![1.0, 1.5, 2.0])
        .with_history(GrainKey::from("a"), at(5), vec![1.0, 2.0, 3.0])
        .with_history(GrainKey::from("b"), at(5), vec![10.0, 20.0, 30.0])
}

pub fn two_series_features(rows: &[(&str, u32)]) -> Frame {
    Frame::new()
        .with_column(
            "date",
            Column::Time(rows.iter().map(|&(_, h)| Some(at(h))).collect()),
        )
        .unwrap()
        .with_column(
            "store",
            Column::Text(rows.iter().map(|&(s, _)| Some(s.to_string())).collect()),
        )
        .unwrap()
}
