//! Inclusive date ranges for `git log --since/--until`.

use std::fmt;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

/// Date format accepted on the command line and in output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors from building a date range.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    /// The input is not a `YYYY-MM-DD` date.
    #[error("invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate {
        /// The rejected input.
        input: String,
    },

    /// The start date is after the end date.
    #[error("start date {start} is after end date {end}")]
    Inverted {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },
}

/// A range of calendar days, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    /// First day counted.
    pub start: NaiveDate,
    /// Last day counted.
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::Inverted`] if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// A single-day range.
    pub const fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Today in local time.
    pub fn today() -> Self {
        Self::day(Local::now().date_naive())
    }

    /// Parse both ends from `YYYY-MM-DD` strings.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::InvalidDate`] for a malformed date and
    /// [`RangeError::Inverted`] if the range runs backwards.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// `--since` value: start of the first day.
    pub fn since_arg(&self) -> String {
        format!("{} 00:00:00", self.start.format(DATE_FORMAT))
    }

    /// `--until` value: end of the last day.
    pub fn until_arg(&self) -> String {
        format!("{} 23:59:59", self.end.format(DATE_FORMAT))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start.format(DATE_FORMAT))
        } else {
            write!(
                f,
                "{} .. {}",
                self.start.format(DATE_FORMAT),
                self.end.format(DATE_FORMAT)
            )
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`RangeError::InvalidDate`] if `input` is not a valid date.
pub fn parse_date(input: &str) -> Result<NaiveDate, RangeError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| RangeError::InvalidDate {
        input: input.to_string(),
    })
}
