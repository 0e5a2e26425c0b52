//! Error types for the forecast-pipeline library.
//!
//! Every error carries a stable [`ReferenceCode`] so log processors can key
//! on the rule that fired rather than on message text.

use std::fmt;
use thiserror::Error;

/// Result type alias for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Boxed error returned by collaborator implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stable identifiers for every rule that can reject a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCode {
    InvalidTargetType,
    InvalidDestinationType,
    NoDestinationOrFeatures,
    DestinationAndFeatures,
    DestinationAndTarget,
    TargetOnly,
    NoTargetInTable,
    TargetSizeMismatch,
    GrainTypeMismatch,
    QuantileRange,
    InvalidConfig,
    TimeConversion,
    EarlyDestination,
    EarlyDestinationInData,
    AbsentGrain,
    NoLastDate,
    NothingToPredict,
    ContextAtEndOfY,
    NonContiguousY,
    NoDataContext,
    AllNullColumn,
    RollingEvaluationNoY,
    EmptyAfterAggregation,
    PredictionFailed,
    NoTargetImputer,
    NoTimeSeriesTransform,
    InvalidPipeline,
    PredictNotSupported,
    MissingColumn,
    FrameShape,
    InvalidParameter,
    EmptyData,
}

impl ReferenceCode {
    /// The code as emitted in messages and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTargetType => "FCPIPE_INVALID_Y_TYPE",
            Self::InvalidDestinationType => "FCPIPE_INVALID_DESTINATION_TYPE",
            Self::NoDestinationOrFeatures => "FCPIPE_NO_DESTINATION_OR_X",
            Self::DestinationAndFeatures => "FCPIPE_DESTINATION_AND_X",
            Self::DestinationAndTarget => "FCPIPE_DESTINATION_AND_Y",
            Self::TargetOnly => "FCPIPE_Y_ONLY",
            Self::NoTargetInTable => "FCPIPE_NO_TARGET_IN_Y_TABLE",
            Self::TargetSizeMismatch => "FCPIPE_Y_SIZE_MISMATCH",
            Self::GrainTypeMismatch => "FCPIPE_GRAIN_TYPE_MISMATCH",
            Self::QuantileRange => "FCPIPE_QUANTILE_RANGE",
            Self::InvalidConfig => "FCPIPE_INVALID_CONFIG",
            Self::TimeConversion => "FCPIPE_TIME_CONVERSION",
            Self::EarlyDestination => "FCPIPE_EARLY_DESTINATION",
            Self::EarlyDestinationInData => "FCPIPE_EARLY_DESTINATION_IN_DATA",
            Self::AbsentGrain => "FCPIPE_ABSENT_GRAIN",
            Self::NoLastDate => "FCPIPE_NO_LAST_DATE",
            Self::NothingToPredict => "FCPIPE_NOTHING_TO_PREDICT",
            Self::ContextAtEndOfY => "FCPIPE_CONTEXT_AT_END_OF_Y",
            Self::NonContiguousY => "FCPIPE_NON_CONTIGUOUS_Y",
            Self::NoDataContext => "FCPIPE_NO_DATA_CONTEXT",
            Self::AllNullColumn => "FCPIPE_ALL_NULL_COLUMN",
            Self::RollingEvaluationNoY => "FCPIPE_ROLLING_EVALUATION_NO_Y",
            Self::EmptyAfterAggregation => "FCPIPE_EMPTY_AFTER_AGGREGATION",
            Self::PredictionFailed => "FCPIPE_PREDICTION_FAILED",
            Self::NoTargetImputer => "FCPIPE_NO_TARGET_IMPUTER",
            Self::NoTimeSeriesTransform => "FCPIPE_NO_TS_TRANSFORM",
            Self::InvalidPipeline => "FCPIPE_INVALID_PIPELINE",
            Self::PredictNotSupported => "FCPIPE_PREDICT_NOT_SUPPORTED",
            Self::MissingColumn => "FCPIPE_MISSING_COLUMN",
            Self::FrameShape => "FCPIPE_FRAME_SHAPE",
            Self::InvalidParameter => "FCPIPE_INVALID_PARAMETER",
            Self::EmptyData => "FCPIPE_EMPTY_DATA",
        }
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The data rule a [`ForecastError::Data`] reports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataErrorKind {
    /// Prediction timestamps precede or equal a series' last training date.
    #[error("prediction data or forecast destination contains dates at or before the last training date")]
    EarlyDestination,

    /// A series absent from training while short series are rejected.
    #[error("time series {grain} was not present in the training data")]
    AbsentGrain { grain: String },

    /// A destination forecast without any recorded last training date.
    #[error("no last training date is recorded for any time series")]
    NoLastDate,

    /// Every target of a series is already known.
    #[error("all target values are known; there is nothing to forecast")]
    NothingToPredict,

    /// The final target is known while earlier targets are missing.
    #[error("the last target value is known but earlier values are missing")]
    ContextAtEndOfY,

    /// The known target region contains holes.
    #[error("known target values are not contiguous")]
    NonContiguousY,

    /// A lookback-aware series has a gap and no known target to fill it from.
    #[error("no target values were provided as context for a series separated from training by a gap")]
    NoDataContext,

    /// A numeric feature column has no values at all.
    #[error("numeric column {column} contains only missing values")]
    AllNullColumn { column: String },

    /// Rolling evaluation without any ground truth.
    #[error("rolling evaluation requires target values, but all of them are missing")]
    RollingEvaluationNoY,

    /// Aggregation produced zero rows.
    #[error("the prediction data is empty after aggregation")]
    EmptyAfterAggregation,

    /// The time column cannot be read as timestamps.
    #[error("column {column} cannot be converted to timestamps: {reason}")]
    TimeConversion { column: String, reason: String },
}

impl DataErrorKind {
    /// Reference code used unless a call site overrides it.
    pub fn default_code(&self) -> ReferenceCode {
        match self {
            Self::EarlyDestination => ReferenceCode::EarlyDestination,
            Self::AbsentGrain { .. } => ReferenceCode::AbsentGrain,
            Self::NoLastDate => ReferenceCode::NoLastDate,
            Self::NothingToPredict => ReferenceCode::NothingToPredict,
            Self::ContextAtEndOfY => ReferenceCode::ContextAtEndOfY,
            Self::NonContiguousY => ReferenceCode::NonContiguousY,
            Self::NoDataContext => ReferenceCode::NoDataContext,
            Self::AllNullColumn { .. } => ReferenceCode::AllNullColumn,
            Self::RollingEvaluationNoY => ReferenceCode::RollingEvaluationNoY,
            Self::EmptyAfterAggregation => ReferenceCode::EmptyAfterAggregation,
            Self::TimeConversion { .. } => ReferenceCode::TimeConversion,
        }
    }

    /// Whether `ignore_data_errors` turns this rule into a warning.
    pub fn is_demotable(&self) -> bool {
        matches!(
            self,
            Self::NothingToPredict
                | Self::ContextAtEndOfY
                | Self::NonContiguousY
                | Self::NoDataContext
                | Self::AllNullColumn { .. }
        )
    }
}

/// Errors that can occur during forecasting operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Illegal argument types or combinations.
    #[error("configuration error [{code}]: {message}")]
    Config { code: ReferenceCode, message: String },

    /// The data violates a forecasting rule.
    #[error("data error [{code}]: {kind}")]
    Data {
        kind: DataErrorKind,
        code: ReferenceCode,
    },

    /// The regressor failed while predicting.
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// Required transformer state is missing.
    #[error("untrained model [{code}]: {message}")]
    UntrainedModel { code: ReferenceCode, message: String },

    /// `predict` is not available on a forecaster.
    #[error("predict is not supported for a forecasting model; use forecast instead")]
    PredictNotSupported,

    /// A named column is absent from a frame.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Column holds a different kind of values than requested.
    #[error("column {column} has unexpected type: expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,
}

impl ForecastError {
    /// Configuration error for the given rule.
    pub fn config(code: ReferenceCode, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
        }
    }

    /// Data error with the rule's default code.
    pub fn data(kind: DataErrorKind) -> Self {
        let code = kind.default_code();
        Self::Data { kind, code }
    }

    /// Data error reported under a specific code.
    pub fn data_at(kind: DataErrorKind, code: ReferenceCode) -> Self {
        Self::Data { kind, code }
    }

    /// Missing trained state.
    pub fn untrained(code: ReferenceCode, message: impl Into<String>) -> Self {
        Self::UntrainedModel {
            code,
            message: message.into(),
        }
    }

    /// The stable code identifying the rule behind this error.
    pub fn reference_code(&self) -> ReferenceCode {
        match self {
            Self::Config { code, .. } => *code,
            Self::Data { code, .. } => *code,
            Self::Prediction(_) => ReferenceCode::PredictionFailed,
            Self::UntrainedModel { code, .. } => *code,
            Self::PredictNotSupported => ReferenceCode::PredictNotSupported,
            Self::ColumnNotFound(_) => ReferenceCode::MissingColumn,
            Self::ColumnType { .. } | Self::DimensionMismatch { .. } => ReferenceCode::FrameShape,
            Self::InvalidParameter(_) => ReferenceCode::InvalidParameter,
            Self::EmptyData => ReferenceCode::EmptyData,
        }
    }

    /// The data rule, if this is a data error.
    pub fn data_kind(&self) -> Option<&DataErrorKind> {
        match self {
            Self::Data { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_reference_codes() {
        let err = ForecastError::config(ReferenceCode::TargetOnly, "y_future requires X_future");
        assert_eq!(
            err.to_string(),
            "configuration error [FCPIPE_Y_ONLY]: y_future requires X_future"
        );

        let err = ForecastError::data(DataErrorKind::NoLastDate);
        assert_eq!(
            err.to_string(),
            "data error [FCPIPE_NO_LAST_DATE]: no last training date is recorded for any time series"
        );
        assert_eq!(err.reference_code(), ReferenceCode::NoLastDate);
    }

    #[test]
    fn data_errors_can_override_code() {
        let err = ForecastError::data_at(
            DataErrorKind::EarlyDestination,
            ReferenceCode::EarlyDestinationInData,
        );
        assert_eq!(err.reference_code(), ReferenceCode::EarlyDestinationInData);
        assert_eq!(err.data_kind(), Some(&DataErrorKind::EarlyDestination));
    }

    #[test]
    fn only_soft_data_rules_are_demotable() {
        assert!(DataErrorKind::NothingToPredict.is_demotable());
        assert!(DataErrorKind::NonContiguousY.is_demotable());
        assert!(DataErrorKind::AllNullColumn {
            column: "x".to_string()
        }
        .is_demotable());
        assert!(!DataErrorKind::EarlyDestination.is_demotable());
        assert!(!DataErrorKind::RollingEvaluationNoY.is_demotable());
        assert!(!DataErrorKind::EmptyAfterAggregation.is_demotable());
    }

    #[test]
    fn every_error_has_a_code() {
        assert_eq!(
            ForecastError::Prediction("boom".to_string()).reference_code(),
            ReferenceCode::PredictionFailed
        );
        assert_eq!(
            ForecastError::PredictNotSupported.reference_code(),
            ReferenceCode::PredictNotSupported
        );
        assert_eq!(
            ForecastError::ColumnNotFound("a".to_string()).reference_code(),
            ReferenceCode::MissingColumn
        );
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::data(DataErrorKind::NothingToPredict);
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
