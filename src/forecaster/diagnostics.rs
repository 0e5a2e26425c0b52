//! Per-call collection of demoted data errors.

use crate::error::{DataErrorKind, ForecastError, Result};

/// Decides whether a data rule raises or becomes a warning, and keeps the
/// warnings of the current call.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    ignore_data_errors: bool,
    warnings: Vec<ForecastError>,
}

impl Diagnostics {
    pub fn new(ignore_data_errors: bool) -> Self {
        Self {
            ignore_data_errors,
            warnings: Vec::new(),
        }
    }

    /// Raise `kind`, or record it as a warning when data errors are ignored
    /// and the rule is demotable.
    pub fn warn_or_raise(&mut self, kind: DataErrorKind) -> Result<()> {
        let demote = self.ignore_data_errors && kind.is_demotable();
        let err = ForecastError::data(kind);
        if !demote {
            return Err(err);
        }
        tracing::warn!(code = %err.reference_code(), "{err}");
        self.warnings.push(err);
        Ok(())
    }

    /// Like [`Diagnostics::warn_or_raise`], but a rule already recorded in
    /// this call is not recorded again.
    pub fn warn_once_or_raise(&mut self, kind: DataErrorKind) -> Result<()> {
        let code = kind.default_code();
        if self.warnings.iter().any(|w| w.reference_code() == code) {
            return Ok(());
        }
        self.warn_or_raise(kind)
    }

    pub fn warnings(&self) -> &[ForecastError] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ForecastError> {
        self.warnings
    }
}
