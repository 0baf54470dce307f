//! Per-root re-scrape schedules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Unit of a schedule interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Interval counted in minutes.
    Minutes,
    /// Interval counted in hours.
    Hours,
    /// Interval counted in days.
    Days,
}

impl IntervalUnit {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalUnit {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            other => Err(MonitorError::InvalidInput(format!(
                "invalid interval unit: {other}"
            ))),
        }
    }
}

/// Re-scrape schedule owned by exactly one root site.
///
/// Mutated only through [`Schedule::set_active`] (toggle) or replaced
/// wholesale when a root is re-added with new interval settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    interval_value: u32,
    interval_unit: IntervalUnit,
    active: bool,
}

impl Schedule {
    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidInput`] if `interval_value` is zero.
    pub fn new(
        interval_value: u32,
        interval_unit: IntervalUnit,
        active: bool,
    ) -> Result<Self, MonitorError> {
        if interval_value == 0 {
            return Err(MonitorError::InvalidInput(
                "interval value must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            interval_value,
            interval_unit,
            active,
        })
    }

    /// Interval magnitude.
    #[must_use]
    pub const fn interval_value(&self) -> u32 {
        self.interval_value
    }

    /// Interval unit.
    #[must_use]
    pub const fn interval_unit(&self) -> IntervalUnit {
        self.interval_unit
    }

    /// Whether the scheduler may enqueue scrapes for this root.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Sets the active flag.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let value = i64::from(self.interval_value);
        match self.interval_unit {
            IntervalUnit::Minutes => Duration::minutes(value),
            IntervalUnit::Hours => Duration::hours(value),
            IntervalUnit::Days => Duration::days(value),
        }
    }

    /// A schedule is due when it is active and at least one interval has
    /// elapsed since the root's last run. A root that never ran is due.
    #[must_use]
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.active && last_run.is_none_or(|last| now - last >= self.interval())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn hourly() -> Schedule {
        let Ok(schedule) = Schedule::new(1, IntervalUnit::Hours, true) else {
            panic!("valid schedule");
        };
        schedule
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Schedule::new(0, IntervalUnit::Minutes, true).is_err());
    }

    #[test]
    fn not_due_before_interval_elapses() {
        let now = Utc::now();
        assert!(!hourly().is_due(Some(now - Duration::minutes(59)), now));
    }

    #[test]
    fn due_after_interval_elapses() {
        let now = Utc::now();
        assert!(hourly().is_due(Some(now - Duration::minutes(61)), now));
        assert!(hourly().is_due(Some(now - Duration::minutes(60)), now));
    }

    #[test]
    fn never_run_is_due() {
        assert!(hourly().is_due(None, Utc::now()));
    }

    #[test]
    fn inactive_is_never_due() {
        let mut schedule = hourly();
        schedule.set_active(false);
        assert!(!schedule.is_due(None, Utc::now()));
    }

    #[test]
    fn unit_parses_singular_and_plural() {
        assert_eq!("Hours".parse::<IntervalUnit>().ok(), Some(IntervalUnit::Hours));
        assert_eq!("day".parse::<IntervalUnit>().ok(), Some(IntervalUnit::Days));
        assert!("fortnights".parse::<IntervalUnit>().is_err());
    }

    #[test]
    fn interval_converts_units() {
        let Ok(schedule) = Schedule::new(2, IntervalUnit::Days, false) else {
            panic!("valid schedule");
        };
        assert_eq!(schedule.interval(), Duration::hours(48));
    }
}
