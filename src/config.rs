//! Forecaster configuration.
//!
//! Configuration can be built in code with the `with_*` methods or read
//! from TOML:
//!
//! ```
//! use forecast_pipeline::config::{ForecasterConfig, UncertaintyGrowth};
//!
//! let config = ForecasterConfig::from_toml_str(
//!     r#"
//!     quantiles = [0.1, 0.5, 0.9]
//!     uncertainty_growth = "linear"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.uncertainty_growth, UncertaintyGrowth::Linear);
//! ```

use crate::error::{ForecastError, ReferenceCode, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with known targets that follow unknown ones in a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateContextPolicy {
    /// Keep the late values; the series counts as known up to its last value.
    #[default]
    RespectLateValues,
    /// Forecast every row after the first unknown target, discarding later
    /// known values.
    IgnoreLateValues,
}

/// Which series are forecast recursively once recursion is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecursionScope {
    /// One series beyond the max horizon switches every series to recursion.
    #[default]
    AllSeries,
    /// Only series beyond the max horizon are forecast recursively.
    PerSeries,
}

/// How residual deviation grows with the number of max-horizon rollings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyGrowth {
    /// `σ · √m`
    #[default]
    Sqrt,
    /// `σ · m`
    Linear,
    /// `σ`
    Constant,
}

impl UncertaintyGrowth {
    /// Deviation for base deviation `sigma` after `m` rollings.
    pub fn apply(&self, sigma: f64, m: usize) -> f64 {
        match self {
            Self::Sqrt => sigma * (m as f64).sqrt(),
            Self::Linear => sigma * m as f64,
            Self::Constant => sigma,
        }
    }
}

/// Forecaster configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    /// Quantiles emitted by `forecast_quantiles`.
    pub quantiles: Vec<f64>,
    pub late_context: LateContextPolicy,
    pub recursion_scope: RecursionScope,
    pub uncertainty_growth: UncertaintyGrowth,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            quantiles: vec![0.5],
            late_context: LateContextPolicy::default(),
            recursion_scope: RecursionScope::default(),
            uncertainty_growth: UncertaintyGrowth::default(),
        }
    }
}

impl ForecasterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            ForecastError::config(
                ReferenceCode::InvalidConfig,
                format!("failed to parse config: {e}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ForecastError::config(
                ReferenceCode::InvalidConfig,
                format!("failed to read config: {e}"),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_quantiles(&self.quantiles)
    }

    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    pub fn with_late_context(mut self, policy: LateContextPolicy) -> Self {
        self.late_context = policy;
        self
    }

    pub fn with_recursion_scope(mut self, scope: RecursionScope) -> Self {
        self.recursion_scope = scope;
        self
    }

    pub fn with_uncertainty_growth(mut self, growth: UncertaintyGrowth) -> Self {
        self.uncertainty_growth = growth;
        self
    }
}

/// Every quantile must lie strictly between 0 and 1.
pub fn validate_quantiles(quantiles: &[f64]) -> Result<()> {
    if let Some(q) = quantiles.iter().find(|q| !(**q > 0.0 && **q < 1.0)) {
        return Err(ForecastError::config(
            ReferenceCode::QuantileRange,
            format!("quantile {q} is outside the open interval (0, 1)"),
        ));
    }
    Ok(())
}
