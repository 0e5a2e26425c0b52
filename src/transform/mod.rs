//! Time-series featurization for trained pipelines.
//!
//! Provides the reference lag transformer, missing-value imputers and the
//! window functions they are built from.
//!
//! # Example
//!
//! ```
//! use forecast_pipeline::core::Frequency;
//! use forecast_pipeline::pipeline::TimeSeriesTransformer;
//! use forecast_pipeline::transform::LagTransformer;
//!
//! let transformer = LagTransformer::new("date", "sales", Frequency::daily())
//!     .with_max_horizon(7)
//!     .with_lags(vec![1, 7]);
//! assert!(transformer.is_lookback_aware());
//! assert_eq!(transformer.lag_column_name(7), "sales_lag7");
//! ```

pub mod impute;
pub mod lag;
pub mod window;

pub use impute::{backfill, fill_forward, GrainDropper, LastValueImputer, MeanImputer};
pub use lag::LagTransformer;
pub use window::{lag_at, window_mean_at};
