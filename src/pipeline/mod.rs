//! Trained pipelines: an ordered list of tagged steps ending in a regressor.

pub mod traits;

pub use traits::{
    AggregationFunction, Featurizer, Regressor, ShortSeriesDropper, ShortSeriesPolicy,
    TargetImputer, TimeSeriesTransformer,
};

use crate::error::{ForecastError, ReferenceCode, Result};
use std::fmt;
use std::sync::Arc;

/// One step of a trained pipeline.
#[derive(Clone)]
pub enum PipelineStep {
    TimeSeriesTransform(Arc<dyn TimeSeriesTransformer>),
    Featurizer(Arc<dyn Featurizer>),
    Regressor(Arc<dyn Regressor>),
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeSeriesTransform(_) => f.write_str("TimeSeriesTransform"),
            Self::Featurizer(_) => f.write_str("Featurizer"),
            Self::Regressor(r) => write!(f, "Regressor({})", r.name()),
        }
    }
}

/// Sequential pipeline with exactly one time-series step and a terminal
/// regressor.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    ts_index: usize,
}

impl Pipeline {
    /// Validate the step layout.
    pub fn new(steps: Vec<PipelineStep>) -> Result<Self> {
        let ts_positions: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, PipelineStep::TimeSeriesTransform(_)))
            .map(|(i, _)| i)
            .collect();
        let ts_index = match ts_positions.as_slice() {
            [i] => *i,
            [] => {
                return Err(ForecastError::config(
                    ReferenceCode::NoTimeSeriesTransform,
                    "the pipeline does not contain a time-series transformer",
                ))
            }
            _ => {
                return Err(ForecastError::config(
                    ReferenceCode::InvalidPipeline,
                    "the pipeline contains more than one time-series transformer",
                ))
            }
        };

        let regressors = steps
            .iter()
            .filter(|s| matches!(s, PipelineStep::Regressor(_)))
            .count();
        if regressors != 1 || !matches!(steps.last(), Some(PipelineStep::Regressor(_))) {
            return Err(ForecastError::config(
                ReferenceCode::InvalidPipeline,
                "the pipeline must end with exactly one regressor",
            ));
        }

        Ok(Self { steps, ts_index })
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn time_series_transformer(&self) -> &Arc<dyn TimeSeriesTransformer> {
        match &self.steps[self.ts_index] {
            PipelineStep::TimeSeriesTransform(ts) => ts,
            _ => unreachable!("ts_index is validated at construction"),
        }
    }

    pub fn regressor(&self) -> &Arc<dyn Regressor> {
        match self.steps.last() {
            Some(PipelineStep::Regressor(r)) => r,
            _ => unreachable!("the last step is validated at construction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frequency;
    use crate::models::LinearRegressor;
    use crate::transform::{LagTransformer, MeanImputer};

    fn ts_step() -> PipelineStep {
        PipelineStep::TimeSeriesTransform(Arc::new(LagTransformer::new(
            "date",
            "y",
            Frequency::hourly(),
        )))
    }

    fn regressor_step() -> PipelineStep {
        PipelineStep::Regressor(Arc::new(LinearRegressor::new(1.0)))
    }

    #[test]
    fn valid_pipeline_exposes_its_steps() {
        let pipeline = Pipeline::new(vec![
            ts_step(),
            PipelineStep::Featurizer(Arc::new(MeanImputer::new())),
            regressor_step(),
        ])
        .unwrap();
        assert_eq!(pipeline.steps().len(), 3);
        assert_eq!(pipeline.time_series_transformer().target_column_name(), "y");
        assert_eq!(pipeline.regressor().name(), "LinearRegressor");
        assert_eq!(
            format!("{:?}", pipeline.steps()),
            "[TimeSeriesTransform, Featurizer, Regressor(LinearRegressor)]"
        );
    }

    #[test]
    fn pipeline_requires_one_time_series_step() {
        let err = Pipeline::new(vec![regressor_step()]).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::NoTimeSeriesTransform);

        let err = Pipeline::new(vec![ts_step(), ts_step(), regressor_step()]).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::InvalidPipeline);
    }

    #[test]
    fn pipeline_must_end_with_a_regressor() {
        let err = Pipeline::new(vec![ts_step()]).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::InvalidPipeline);

        let err = Pipeline::new(vec![regressor_step(), ts_step()]).unwrap_err();
        assert_eq!(err.reference_code(), ReferenceCode::InvalidPipeline);
    }
}
