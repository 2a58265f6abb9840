use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// A (year, week) bucket. Weeks follow ISO-8601, so `year` is the ISO week-based
/// year and `week` is in 1..=53.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub week: u32,
}

impl Period {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let iso = at.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

pub trait PeriodClock: Send + Sync {
    fn current_period(&self) -> Period;
}

/// Wall-clock periods in UTC, so every process maps an instant to the same bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PeriodClock for SystemClock {
    fn current_period(&self) -> Period {
        Period::from_datetime(Utc::now())
    }
}

/// Pinned to one period. Used by seeding, imports and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Period);

impl PeriodClock for FixedClock {
    fn current_period(&self) -> Period {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn maps_instant_to_iso_week() {
        let at = Utc.with_ymd_and_hms(2020, 6, 24, 12, 0, 0).unwrap();
        assert_eq!(Period::from_datetime(at), Period::new(2020, 26));
    }

    #[test]
    fn year_boundary_uses_week_based_year() {
        // 2021-01-01 is a Friday and belongs to 2020-W53.
        let at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Period::from_datetime(at), Period::new(2020, 53));
    }

    #[test]
    fn periods_order_chronologically() {
        assert!(Period::new(2020, 53) < Period::new(2021, 1));
        assert!(Period::new(2020, 26) < Period::new(2020, 27));
    }

    #[test]
    fn display_pads_week() {
        assert_eq!(Period::new(2020, 7).to_string(), "2020-W07");
    }
}
