//! Calendar context for entries
//!
//! Ramadan changes meal timing for much of the study population, so entries are
//! annotated with whether they fall inside the study year's Ramadan.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive date range of Ramadan for the study year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamadanWindow {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl Default for RamadanWindow {
    /// Ramadan 1444 AH as observed in Malaysia
    fn default() -> Self {
        Self {
            first_day: NaiveDate::from_ymd_opt(2023, 3, 23).expect("valid date"),
            last_day: NaiveDate::from_ymd_opt(2023, 4, 21).expect("valid date"),
        }
    }
}

impl RamadanWindow {
    pub fn new(first_day: NaiveDate, last_day: NaiveDate) -> Self {
        Self {
            first_day,
            last_day,
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let date = timestamp.date();
        self.first_day <= date && date <= self.last_day
    }
}

/// English name of the weekday, e.g. `"Saturday"`
pub fn week_day_name(timestamp: NaiveDateTime) -> &'static str {
    match timestamp.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn is_weekend(timestamp: NaiveDateTime) -> bool {
    matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun)
}
