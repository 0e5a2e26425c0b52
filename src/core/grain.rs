//! Series identity ("grain") keys.

use crate::core::frame::Column;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column name used when a model was trained on one anonymous series.
pub const DUMMY_GRAIN_COLUMN: &str = "_automl_grain_col";

/// Type of a grain column as seen during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrainType {
    Integer,
    Text,
}

/// One component of a series identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrainValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for GrainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Tuple of grain values identifying one time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrainKey(Vec<GrainValue>);

impl GrainKey {
    pub fn new(values: Vec<GrainValue>) -> Self {
        Self(values)
    }

    /// Key of the sentinel single-series grain.
    pub fn dummy() -> Self {
        Self(vec![GrainValue::Text(DUMMY_GRAIN_COLUMN.to_string())])
    }

    pub fn values(&self) -> &[GrainValue] {
        &self.0
    }
}

impl fmt::Display for GrainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

impl From<&str> for GrainKey {
    fn from(value: &str) -> Self {
        Self(vec![GrainValue::Text(value.to_string())])
    }
}

impl From<i64> for GrainKey {
    fn from(value: i64) -> Self {
        Self(vec![GrainValue::Int(value)])
    }
}

impl From<Vec<GrainValue>> for GrainKey {
    fn from(values: Vec<GrainValue>) -> Self {
        Self(values)
    }
}

/// Read the grain value of one cell, if the cell is not null.
pub(crate) fn cell_value(column: &Column, row: usize) -> Option<GrainValue> {
    match column {
        Column::Int(v) => v[row].map(GrainValue::Int),
        Column::Text(v) => v[row].clone().map(GrainValue::Text),
        Column::Float(v) => {
            let x = v[row];
            if x.is_nan() {
                None
            } else if x.fract() == 0.0 && x.abs() < 9.0e15 {
                Some(GrainValue::Int(x as i64))
            } else {
                Some(GrainValue::Text(x.to_string()))
            }
        }
        Column::Time(v) => v[row].map(|t| GrainValue::Text(t.to_rfc3339())),
    }
}

/// Convert a grain column to the type seen during training.
///
/// Returns `None` when some value cannot be represented in the target type
/// or is missing.
pub fn coerce_grain_column(column: &Column, to: GrainType) -> Option<Column> {
    let n = column.len();
    match to {
        GrainType::Text => {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(Some(cell_value(column, i)?.to_string()));
            }
            Some(Column::Text(out))
        }
        GrainType::Integer => {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let value = match cell_value(column, i)? {
                    GrainValue::Int(v) => v,
                    GrainValue::Text(s) => s.trim().parse::<i64>().ok()?,
                };
                out.push(Some(value));
            }
            Some(Column::Int(out))
        }
    }
}

/// Build a column of `n` copies of one grain value.
pub(crate) fn repeat_value(value: &GrainValue, n: usize) -> Column {
    match value {
        GrainValue::Int(v) => Column::Int(vec![Some(*v); n]),
        GrainValue::Text(v) => Column::Text(vec![Some(v.clone()); n]),
    }
}
