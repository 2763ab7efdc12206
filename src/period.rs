//! Accounting periods in `YYYY-MM` form

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::{CloseError, CloseResult};

static PERIOD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("period pattern is valid"));

/// A calendar month used as the reconciliation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Build a period from its parts, rejecting months outside 1..=12
    pub fn new(year: i32, month: u32) -> CloseResult<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(CloseError::Validation(
                "period must be in YYYY-MM format".to_string(),
            ));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period
    pub fn start(&self) -> NaiveDate {
        first_of_month(self.year, self.month)
    }

    /// First day of the following month; the exclusive end of the period
    pub fn end_exclusive(&self) -> NaiveDate {
        self.next().start()
    }

    /// The following calendar month
    pub fn next(&self) -> Period {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Whether a date falls within `[start, end_exclusive)`
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date < self.end_exclusive()
    }

    /// Period a date belongs to
    pub fn of_date(date: NaiveDate) -> Period {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // year and month are range-checked on construction
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = CloseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_period(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        validate_period(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a `YYYY-MM` period string with month 01-12
pub fn validate_period(value: &str) -> CloseResult<Period> {
    if !PERIOD_PATTERN.is_match(value) {
        return Err(CloseError::Validation(
            "period must be in YYYY-MM format".to_string(),
        ));
    }

    let year = value[..4]
        .parse::<i32>()
        .map_err(|e| CloseError::Validation(format!("period year: {e}")))?;
    let month = value[5..]
        .parse::<u32>()
        .map_err(|e| CloseError::Validation(format!("period month: {e}")))?;

    Period::new(year, month)
}

/// Every period from `from` to `to` inclusive, one calendar month at a time
pub fn iter_periods(from: Period, to: Period) -> CloseResult<Vec<Period>> {
    if from > to {
        return Err(CloseError::Validation(
            "period_from must be <= period_to".to_string(),
        ));
    }

    let mut periods = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        periods.push(cursor);
        cursor = cursor.next();
    }
    Ok(periods)
}
