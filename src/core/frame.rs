//! Columnar frame carrying prediction inputs and engineered features.

use crate::core::grain::{cell_value, GrainKey};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single named column. A `NaN` float counts as a null.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    Time(Vec<Option<DateTime<Utc>>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Time(_) => "time",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Float(_) | Self::Int(_))
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Float(v) => v[row].is_nan(),
            Self::Int(v) => v[row].is_none(),
            Self::Text(v) => v[row].is_none(),
            Self::Time(v) => v[row].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// True for an empty column as well.
    pub fn is_all_null(&self) -> bool {
        self.null_count() == self.len()
    }

    /// A column of the same kind holding `n` nulls.
    pub fn nulls(&self, n: usize) -> Column {
        match self {
            Self::Float(_) => Self::Float(vec![f64::NAN; n]),
            Self::Int(_) => Self::Int(vec![None; n]),
            Self::Text(_) => Self::Text(vec![None; n]),
            Self::Time(_) => Self::Time(vec![None; n]),
        }
    }

    /// Gather rows by index.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Self::Float(v) => Self::Float(rows.iter().map(|&i| v[i]).collect()),
            Self::Int(v) => Self::Int(rows.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(rows.iter().map(|&i| v[i].clone()).collect()),
            Self::Time(v) => Self::Time(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Numeric values as floats with nulls as `NaN`.
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float(v) => Some(v.clone()),
            Self::Int(v) => Some(
                v.iter()
                    .map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN))
                    .collect(),
            ),
            _ => None,
        }
    }

    fn append(self, other: Column, name: &str) -> Result<Column> {
        match (self, other) {
            (Self::Float(mut a), Self::Float(b)) => {
                a.extend(b);
                Ok(Self::Float(a))
            }
            (Self::Int(mut a), Self::Int(b)) => {
                a.extend(b);
                Ok(Self::Int(a))
            }
            (Self::Text(mut a), Self::Text(b)) => {
                a.extend(b);
                Ok(Self::Text(a))
            }
            (Self::Time(mut a), Self::Time(b)) => {
                a.extend(b);
                Ok(Self::Time(a))
            }
            (a @ Self::Int(_), b @ Self::Float(_)) | (a @ Self::Float(_), b @ Self::Int(_)) => {
                let mut values = a.to_floats().unwrap_or_default();
                values.extend(b.to_floats().unwrap_or_default());
                Ok(Self::Float(values))
            }
            (a, _) => Err(ForecastError::ColumnType {
                column: name.to_string(),
                expected: a.kind(),
            }),
        }
    }

    fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        match self {
            Self::Float(v) => match (v[a].is_nan(), v[b].is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => v[a].partial_cmp(&v[b]).unwrap_or(Ordering::Equal),
            },
            Self::Int(v) => v[a].cmp(&v[b]),
            Self::Text(v) => v[a].cmp(&v[b]),
            Self::Time(v) => v[a].cmp(&v[b]),
        }
    }
}

/// Ordered set of named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Column by name or [`ForecastError::ColumnNotFound`].
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| ForecastError::ColumnNotFound(name.to_string()))
    }

    /// Builder-style insert; see [`Frame::set_column`].
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.set_column(name, column)?;
        Ok(self)
    }

    /// Insert a column, replacing one of the same name in place.
    pub fn set_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        let replacing = self.position(&name);
        let other_columns = self.width() - usize::from(replacing.is_some());
        if other_columns > 0 && column.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: column.len(),
            });
        }
        match replacing {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let i = self.position(name)?;
        self.names.remove(i);
        Some(self.columns.remove(i))
    }

    /// Numeric column as floats, nulls as `NaN`.
    pub fn floats(&self, name: &str) -> Result<Vec<f64>> {
        self.require(name)?
            .to_floats()
            .ok_or_else(|| ForecastError::ColumnType {
                column: name.to_string(),
                expected: "float",
            })
    }

    /// Timestamp column; every value must be present.
    pub fn times(&self, name: &str) -> Result<Vec<DateTime<Utc>>> {
        match self.require(name)? {
            Column::Time(v) => v
                .iter()
                .map(|t| {
                    t.ok_or_else(|| {
                        ForecastError::InvalidParameter(format!("column {name} contains null timestamps"))
                    })
                })
                .collect(),
            _ => Err(ForecastError::ColumnType {
                column: name.to_string(),
                expected: "time",
            }),
        }
    }

    /// Gather rows by index, in the given order.
    pub fn take(&self, rows: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Keep the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Frame {
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.take(&rows)
    }

    /// Stack frames vertically.
    ///
    /// The schema is the union of all schemas in order of first appearance;
    /// columns missing from a frame are null-filled. Mixed int and float
    /// columns are promoted to float.
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let mut names: Vec<String> = Vec::new();
        let mut prototypes: Vec<&Column> = Vec::new();
        for frame in frames {
            for (name, column) in frame.columns() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                    prototypes.push(column);
                }
            }
        }

        let mut columns = Vec::with_capacity(names.len());
        for (name, prototype) in names.iter().zip(prototypes) {
            let mut merged = prototype.nulls(0);
            for frame in frames {
                let part = match frame.column(name) {
                    Some(c) => c.clone(),
                    None => prototype.nulls(frame.len()),
                };
                merged = merged.append(part, name)?;
            }
            columns.push(merged);
        }
        Ok(Frame { names, columns })
    }

    /// Stable sort by the listed columns, lexicographically.
    pub fn sort_by_keys(&self, keys: &[String]) -> Result<Frame> {
        let key_columns = keys
            .iter()
            .map(|k| self.require(k))
            .collect::<Result<Vec<_>>>()?;
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            key_columns
                .iter()
                .map(|c| c.compare_rows(a, b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(self.take(&order))
    }

    /// Grain key of every row.
    pub fn grain_keys(&self, grain_columns: &[String]) -> Result<Vec<GrainKey>> {
        let columns = grain_columns
            .iter()
            .map(|g| self.require(g))
            .collect::<Result<Vec<_>>>()?;
        (0..self.len())
            .map(|row| {
                columns
                    .iter()
                    .zip(grain_columns)
                    .map(|(c, name)| {
                        cell_value(c, row).ok_or_else(|| {
                            ForecastError::InvalidParameter(format!(
                                "grain column {name} has a missing value at row {row}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(GrainKey::new)
            })
            .collect()
    }

    /// Row indices per grain, groups ordered by key, rows in frame order.
    pub fn group_by_grain(&self, grain_columns: &[String]) -> Result<BTreeMap<GrainKey, Vec<usize>>> {
        let mut groups: BTreeMap<GrainKey, Vec<usize>> = BTreeMap::new();
        for (row, key) in self.grain_keys(grain_columns)?.into_iter().enumerate() {
            groups.entry(key).or_default().push(row);
        }
        Ok(groups)
    }
}
