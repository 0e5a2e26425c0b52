//! Core data structures: frames, series keys, the time grid and results.

mod forecast;
mod frame;
mod frequency;
mod grain;

pub use forecast::{ForecastOutput, RollingEvaluation};
pub use frame::{Column, Frame};
pub use frequency::Frequency;
pub use grain::{coerce_grain_column, GrainKey, GrainType, GrainValue, DUMMY_GRAIN_COLUMN};

pub(crate) use grain::repeat_value;
