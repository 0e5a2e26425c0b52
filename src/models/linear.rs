//! Fixed-coefficient linear regressor.
//!
//! Predicts `intercept + Σ coef[name] · x[name]` over named engineered
//! columns. Columns without a coefficient are ignored.

use crate::core::Frame;
use crate::error::{BoxError, ForecastError};
use crate::pipeline::Regressor;

/// Linear regressor built from already-estimated coefficients.
#[derive(Debug, Clone, Default)]
pub struct LinearRegressor {
    intercept: f64,
    coefficients: Vec<(String, f64)>,
}

impl LinearRegressor {
    pub fn new(intercept: f64) -> Self {
        Self {
            intercept,
            coefficients: Vec::new(),
        }
    }

    pub fn with_coefficient(mut self, column: impl Into<String>, value: f64) -> Self {
        self.coefficients.push((column.into(), value));
        self
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[(String, f64)] {
        &self.coefficients
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, features: &Frame) -> Result<Vec<f64>, BoxError> {
        let mut out = vec![self.intercept; features.len()];
        for (name, coef) in &self.coefficients {
            let values = features.floats(name)?;
            if let Some(i) = values.iter().position(|v| v.is_nan()) {
                return Err(Box::new(ForecastError::InvalidParameter(format!(
                    "feature {name} is missing at row {i}"
                ))));
            }
            for (o, v) in out.iter_mut().zip(values) {
                *o += coef * v;
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "LinearRegressor"
    }
}
