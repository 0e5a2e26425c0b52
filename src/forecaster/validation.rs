//! Argument checks and input normalization.
//!
//! Every rule here runs before any forecasting work. Illegal argument types
//! and combinations are configuration errors; an unreadable time column is a
//! data error.

use crate::core::{coerce_grain_column, Column, Frame, DUMMY_GRAIN_COLUMN};
use crate::error::{DataErrorKind, ForecastError, ReferenceCode, Result};
use crate::forecaster::request::{Destination, ForecastRequest, TargetInput};
use crate::pipeline::TimeSeriesTransformer;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Known targets after type checks.
#[derive(Debug, Clone)]
pub(crate) enum NormalizedTarget {
    Values(Vec<f64>),
    Table(Frame),
}

#[derive(Debug, Clone)]
pub(crate) enum PredictionInput {
    Features {
        x: Frame,
        y: Option<NormalizedTarget>,
    },
    Destination(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub(crate) struct NormalizedRequest {
    pub input: PredictionInput,
    pub ignore_data_errors: bool,
}

/// Parse a timestamp from RFC 3339, `%Y-%m-%d %H:%M:%S`,
/// `%Y-%m-%dT%H:%M:%S` or `%Y-%m-%d` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn time_conversion(column: &str, reason: String) -> ForecastError {
    ForecastError::data(DataErrorKind::TimeConversion {
        column: column.to_string(),
        reason,
    })
}

/// Convert the time column to timestamps in place.
pub(crate) fn coerce_time_column(frame: &mut Frame, name: &str) -> Result<()> {
    let converted = match frame.require(name)? {
        Column::Time(values) => {
            if let Some(row) = values.iter().position(Option::is_none) {
                return Err(time_conversion(name, format!("missing value at row {row}")));
            }
            return Ok(());
        }
        Column::Text(values) => values
            .iter()
            .enumerate()
            .map(|(row, v)| match v.as_deref().map(parse_timestamp) {
                Some(Some(t)) => Ok(Some(t)),
                Some(None) => Err(time_conversion(
                    name,
                    format!("value {:?} at row {row} is not a timestamp", v.as_deref().unwrap_or("")),
                )),
                None => Err(time_conversion(name, format!("missing value at row {row}"))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(time_conversion(
                name,
                format!("a {} column cannot hold timestamps", other.kind()),
            ))
        }
    };
    frame.set_column(name, Column::Time(converted))
}

/// Convert grain columns to the types seen during training.
///
/// With `require_all`, a missing non-sentinel grain column is an error;
/// otherwise missing columns are skipped.
pub(crate) fn coerce_grain_columns(
    frame: &mut Frame,
    ts: &dyn TimeSeriesTransformer,
    require_all: bool,
) -> Result<()> {
    let types = ts.grain_column_types();
    for (i, name) in ts.grain_column_names().iter().enumerate() {
        let Some(column) = frame.column(name) else {
            if require_all && name != DUMMY_GRAIN_COLUMN {
                return Err(ForecastError::ColumnNotFound(name.clone()));
            }
            continue;
        };
        let Some(&grain_type) = types.get(i) else {
            continue;
        };
        let coerced = coerce_grain_column(column, grain_type).ok_or_else(|| {
            ForecastError::config(
                ReferenceCode::GrainTypeMismatch,
                format!("values of grain column {name} cannot be converted to {grain_type:?}"),
            )
        })?;
        frame.set_column(name.as_str(), coerced)?;
    }
    Ok(())
}

fn normalize_target(
    target: TargetInput,
    x: &Frame,
    ts: &dyn TimeSeriesTransformer,
) -> Result<NormalizedTarget> {
    let target_name = ts.target_column_name();
    match target {
        TargetInput::Matrix(rows) => {
            if rows.iter().any(|r| r.len() != 1) {
                return Err(ForecastError::config(
                    ReferenceCode::InvalidTargetType,
                    "y_future must be a table or a one-dimensional array",
                ));
            }
            normalize_target(
                TargetInput::Values(rows.into_iter().map(|r| r[0]).collect()),
                x,
                ts,
            )
        }
        TargetInput::Values(values) => {
            if values.len() != x.len() {
                return Err(ForecastError::config(
                    ReferenceCode::TargetSizeMismatch,
                    format!(
                        "y_future has {} values but X_future has {} rows",
                        values.len(),
                        x.len()
                    ),
                ));
            }
            Ok(NormalizedTarget::Values(values))
        }
        TargetInput::Table(mut table) => {
            if !table.has_column(target_name) {
                return Err(ForecastError::config(
                    ReferenceCode::NoTargetInTable,
                    format!("y_future does not contain the target column {target_name}"),
                ));
            }
            if !table.column(target_name).is_some_and(Column::is_numeric) {
                return Err(ForecastError::config(
                    ReferenceCode::InvalidTargetType,
                    format!("target column {target_name} must be numeric"),
                ));
            }
            if table.has_column(ts.time_column_name()) {
                coerce_time_column(&mut table, ts.time_column_name())?;
            }
            coerce_grain_columns(&mut table, ts, false)?;
            Ok(NormalizedTarget::Table(table))
        }
    }
}

fn normalize_destination(destination: Destination) -> Result<DateTime<Utc>> {
    match destination {
        Destination::Timestamp(t) => Ok(t),
        Destination::Text(s) => parse_timestamp(&s).ok_or_else(|| {
            ForecastError::config(
                ReferenceCode::InvalidDestinationType,
                format!("forecast_destination {s:?} is not a timestamp"),
            )
        }),
        Destination::PerSeries(_) => Err(ForecastError::config(
            ReferenceCode::InvalidDestinationType,
            "forecast_destination must be a single timestamp; per-series destinations are not accepted",
        )),
    }
}

/// Check argument combinations and types, then coerce time and grain
/// columns.
pub(crate) fn validate_request(
    request: ForecastRequest,
    ts: &dyn TimeSeriesTransformer,
) -> Result<NormalizedRequest> {
    let (features, target, destination, ignore_data_errors) = request.into_parts();

    if features.is_none() && target.is_some() {
        return Err(if destination.is_some() {
            ForecastError::config(
                ReferenceCode::DestinationAndTarget,
                "y_future and forecast_destination cannot both be set",
            )
        } else {
            ForecastError::config(
                ReferenceCode::TargetOnly,
                "y_future requires X_future",
            )
        });
    }

    let input = match (features, destination) {
        (None, None) => {
            return Err(ForecastError::config(
                ReferenceCode::NoDestinationOrFeatures,
                "either X_future or forecast_destination must be set",
            ))
        }
        (Some(_), Some(_)) => {
            return Err(ForecastError::config(
                ReferenceCode::DestinationAndFeatures,
                "X_future and forecast_destination cannot both be set",
            ))
        }
        (None, Some(destination)) => PredictionInput::Destination(normalize_destination(destination)?),
        (Some(mut x), None) => {
            let y = target
                .map(|t| normalize_target(t, &x, ts))
                .transpose()?;
            coerce_grain_columns(&mut x, ts, true)?;
            coerce_time_column(&mut x, ts.time_column_name())?;
            PredictionInput::Features { x, y }
        }
    };

    Ok(NormalizedRequest {
        input,
        ignore_data_errors,
    })
}
