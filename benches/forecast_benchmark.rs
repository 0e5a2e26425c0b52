//! Benchmarks for the forecasting paths.

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forecast_pipeline::core::GrainType;
use forecast_pipeline::pipeline::PipelineStep;
use forecast_pipeline::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn training_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

fn build_forecaster(series: usize) -> Forecaster {
    let mut rng = StdRng::seed_from_u64(42);
    let mut transformer = LagTransformer::new("date", "y", Frequency::hourly())
        .with_grain_columns(vec!["id".to_string()], vec![GrainType::Integer])
        .with_feature("price", 10.0)
        .with_max_horizon(24)
        .with_lags(vec![1, 2, 24])
        .with_rolling_window(12)
        .with_horizon_column("horizon")
        .with_residual_stddev((1..=24).map(|h| 0.5 + 0.1 * h as f64).collect());
    for id in 0..series {
        let tail: Vec<f64> = (0..48)
            .map(|i| 100.0 + (i as f64 / 4.0).sin() * 10.0 + rng.gen_range(-1.0..1.0))
            .collect();
        transformer = transformer.with_history(GrainKey::from(id as i64), training_end(), tail);
    }
    let model = LinearRegressor::new(1.0)
        .with_coefficient("y_lag1", 0.6)
        .with_coefficient("y_lag2", 0.2)
        .with_coefficient("y_lag24", 0.1)
        .with_coefficient("y_rolling_mean12", 0.1)
        .with_coefficient("price", -0.05);
    let pipeline = Pipeline::new(vec![
        PipelineStep::TimeSeriesTransform(Arc::new(transformer)),
        PipelineStep::Regressor(Arc::new(model)),
    ])
    .unwrap();
    Forecaster::new(pipeline)
}

fn build_features(series: usize, steps: usize) -> (Frame, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut times = Vec::with_capacity(series * steps);
    let mut ids = Vec::with_capacity(series * steps);
    let mut price = Vec::with_capacity(series * steps);
    let mut y = Vec::with_capacity(series * steps);
    for id in 0..series {
        for step in 1..=steps {
            times.push(Some(training_end() + Duration::hours(step as i64)));
            ids.push(Some(id as i64));
            price.push(10.0 + rng.gen_range(-2.0..2.0));
            y.push(100.0 + rng.gen_range(-5.0..5.0));
        }
    }
    let frame = Frame::new()
        .with_column("date", Column::Time(times))
        .unwrap()
        .with_column("id", Column::Int(ids))
        .unwrap()
        .with_column("price", Column::Float(price))
        .unwrap();
    (frame, y)
}

fn bench_single_shot(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_shot");

    for series in [1, 10, 50].iter() {
        let mut forecaster = build_forecaster(*series);
        let (x, _) = build_features(*series, 24);

        group.bench_with_input(BenchmarkId::new("forecast", series), series, |b, _| {
            b.iter(|| {
                forecaster
                    .forecast(ForecastRequest::new().with_features(black_box(x.clone())))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_recursive(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive");
    let mut forecaster = build_forecaster(10);

    for steps in [48, 96, 168].iter() {
        let (x, _) = build_features(10, *steps);

        group.bench_with_input(BenchmarkId::new("forecast", steps), steps, |b, _| {
            b.iter(|| {
                forecaster
                    .forecast(ForecastRequest::new().with_features(black_box(x.clone())))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_quantiles(c: &mut Criterion) {
    let mut forecaster = build_forecaster(10);
    forecaster.set_quantiles(vec![0.05, 0.25, 0.5, 0.75, 0.95]).unwrap();
    let (x, _) = build_features(10, 72);

    c.bench_function("forecast_quantiles", |b| {
        b.iter(|| {
            forecaster
                .forecast_quantiles(ForecastRequest::new().with_features(black_box(x.clone())))
                .unwrap()
        })
    });
}

fn bench_rolling_evaluation(c: &mut Criterion) {
    let mut forecaster = build_forecaster(10);
    let (x, y) = build_features(10, 96);

    c.bench_function("rolling_evaluation", |b| {
        b.iter(|| {
            forecaster
                .rolling_evaluation(black_box(&x), TargetInput::Values(y.clone()), false)
                .unwrap()
        })
    });
}

fn bench_destination(c: &mut Criterion) {
    let mut forecaster = build_forecaster(50);
    let destination = training_end() + Duration::hours(24);

    c.bench_function("forecast_destination", |b| {
        b.iter(|| {
            forecaster
                .forecast(ForecastRequest::new().with_destination(black_box(destination)))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_single_shot,
    bench_recursive,
    bench_quantiles,
    bench_rolling_evaluation,
    bench_destination,
);
criterion_main!(benches);
