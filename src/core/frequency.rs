//! Fixed-step time grid.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};

/// Fixed time delta between consecutive grid points of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    step: Duration,
}

impl Frequency {
    /// Create a frequency from a positive duration.
    ///
    /// The grid has millisecond resolution, so the step must be a whole
    /// number of milliseconds.
    pub fn new(step: Duration) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(ForecastError::InvalidParameter(format!(
                "frequency must be a positive duration, got {step}"
            )));
        }
        if step < Duration::milliseconds(1) {
            return Err(ForecastError::InvalidParameter(format!(
                "frequency must be at least 1 millisecond, got {step}"
            )));
        }
        if step != Duration::milliseconds(step.num_milliseconds()) {
            return Err(ForecastError::InvalidParameter(format!(
                "frequency must be a whole number of milliseconds, got {step}"
            )));
        }
        Ok(Self { step })
    }

    pub fn hourly() -> Self {
        Self {
            step: Duration::hours(1),
        }
    }

    pub fn daily() -> Self {
        Self {
            step: Duration::days(1),
        }
    }

    pub fn duration(&self) -> Duration {
        self.step
    }

    fn millis(&self) -> i64 {
        self.step.num_milliseconds()
    }

    /// Move `k` steps along the grid (negative `k` moves back).
    pub fn advance(&self, t: DateTime<Utc>, k: i64) -> DateTime<Utc> {
        t + Duration::milliseconds(self.millis() * k)
    }

    /// Whole steps from `from` to `to`, rounded towards negative infinity.
    pub fn steps_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        (to - from).num_milliseconds().div_euclid(self.millis())
    }

    /// Whether `t` lies on the grid anchored at `anchor`.
    pub fn is_on_grid(&self, anchor: DateTime<Utc>, t: DateTime<Utc>) -> bool {
        (t - anchor).num_milliseconds().rem_euclid(self.millis()) == 0
    }

    /// The latest grid point anchored at `anchor` that is not after `t`.
    pub fn floor_to_grid(&self, anchor: DateTime<Utc>, t: DateTime<Utc>) -> DateTime<Utc> {
        self.advance(anchor, self.steps_between(anchor, t))
    }

    /// Grid points `start, start + F, ...` up to and including `end`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if end < start {
            return Vec::new();
        }
        let n = self.steps_between(start, end);
        (0..=n).map(|k| self.advance(start, k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn frequency_rejects_non_positive_steps() {
        assert!(Frequency::new(Duration::zero()).is_err());
        assert!(Frequency::new(Duration::hours(-1)).is_err());
        assert!(Frequency::new(Duration::minutes(15)).is_ok());
    }

    #[test]
    fn frequency_rejects_sub_millisecond_steps() {
        let err = Frequency::new(Duration::microseconds(500)).unwrap_err();
        assert!(matches!(&err, ForecastError::InvalidParameter(m) if m.contains("at least 1 millisecond")));

        let err = Frequency::new(Duration::microseconds(1500)).unwrap_err();
        assert!(matches!(&err, ForecastError::InvalidParameter(m) if m.contains("whole number of milliseconds")));

        let f = Frequency::new(Duration::milliseconds(1)).unwrap();
        assert_eq!(f.steps_between(at(0), at(0) + Duration::seconds(1)), 1000);
    }

    #[test]
    fn frequency_counts_steps_and_advances() {
        let f = Frequency::hourly();
        assert_eq!(f.steps_between(at(5), at(8)), 3);
        assert_eq!(f.steps_between(at(8), at(5)), -3);
        assert_eq!(f.advance(at(5), 4), at(9));
        assert_eq!(f.advance(at(5), -2), at(3));
    }

    #[test]
    fn frequency_range_is_inclusive() {
        let f = Frequency::hourly();
        assert_eq!(f.range(at(6), at(9)), vec![at(6), at(7), at(8), at(9)]);
        assert_eq!(f.range(at(6), at(6)), vec![at(6)]);
        assert!(f.range(at(7), at(6)).is_empty());
    }

    #[test]
    fn frequency_detects_off_grid_points() {
        let f = Frequency::hourly();
        let half = at(6) + Duration::minutes(30);
        assert!(f.is_on_grid(at(5), at(9)));
        assert!(!f.is_on_grid(at(5), half));
        assert_eq!(f.floor_to_grid(at(5), half), at(6));
    }
}
