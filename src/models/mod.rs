//! Regressors usable as the terminal step of a pipeline.

pub mod linear;

pub use linear::LinearRegressor;
