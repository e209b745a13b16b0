//! Mixed-unit lifetimes.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SECONDS_PER_MINUTE: f64 = 60.0;
pub const SECONDS_PER_HOUR: f64 = 3_600.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const SECONDS_PER_WEEK: f64 = 604_800.0;
/// About 30.437 days. Must stay paired with [`SECONDS_PER_YEAR`].
pub const SECONDS_PER_MONTH: f64 = 2_629_740.0;
/// About 365.2419 days, not 365.25. Existing lifetimes were tuned against this
/// exact value: 2 years, 10 h, 18 min and 15.42 s is 63 150 895.42 s, and
/// 365.25 days would turn that into 63 152 295.42 s.
pub const SECONDS_PER_YEAR: f64 = 31_556_900.0;

/// A duration expressed as a sum of calendar and clock units.
///
/// Every unit defaults to zero, so `Lifetime { minutes: 5.0, ..Default::default() }`
/// and the builder-style `Lifetime::default().minutes(5.0)` are equivalent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Lifetime {
    pub years: f64,
    pub months: f64,
    pub weeks: f64,
    pub days: f64,
    pub hours: f64,
    pub minutes: f64,
    pub seconds: f64,
}

impl Lifetime {
    pub fn from_seconds(seconds: f64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    pub fn years(mut self, years: f64) -> Self {
        self.years = years;
        self
    }

    pub fn months(mut self, months: f64) -> Self {
        self.months = months;
        self
    }

    pub fn weeks(mut self, weeks: f64) -> Self {
        self.weeks = weeks;
        self
    }

    pub fn days(mut self, days: f64) -> Self {
        self.days = days;
        self
    }

    pub fn hours(mut self, hours: f64) -> Self {
        self.hours = hours;
        self
    }

    pub fn minutes(mut self, minutes: f64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn seconds(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    /// Total length in seconds. Never clamps; negative totals are returned as-is.
    pub fn to_seconds(&self) -> f64 {
        self.years * SECONDS_PER_YEAR
            + self.months * SECONDS_PER_MONTH
            + self.weeks * SECONDS_PER_WEEK
            + self.days * SECONDS_PER_DAY
            + self.hours * SECONDS_PER_HOUR
            + self.minutes * SECONDS_PER_MINUTE
            + self.seconds
    }

    /// Validated duration for use as a cache lifetime.
    ///
    /// Zero, negative and non-finite totals are rejected.
    pub fn to_duration(&self) -> Result<Duration, CacheError> {
        let seconds = self.to_seconds();
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(CacheError::Lifetime { seconds });
        }
        Duration::try_from_secs_f64(seconds).map_err(|_| CacheError::Lifetime { seconds })
    }
}

/// Convenience form of [`Lifetime::to_seconds`].
pub fn to_seconds(lifetime: &Lifetime) -> f64 {
    lifetime.to_seconds()
}
