//! Calendar-month keys. Every monthly table in the pipeline is indexed by the first day of the
//! month, written as an ISO date (`2020-01-01`).

use crate::error::ValidationError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A calendar month, ordered chronologically.
///
/// # Examples
///
/// ```
/// use heat_prognosis::Month;
///
/// let jan = Month::new(1, 2020).unwrap();
/// assert_eq!(jan.to_string(), "2020-01-01");
/// assert_eq!(jan.add_months(-1), Month::new(12, 2019).unwrap());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Returns `None` when `month` is outside `1..=12`.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        // Always valid: month is 1..=12 by construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// The last month that has fully elapsed on `today`.
    pub fn last_completed(today: NaiveDate) -> Self {
        Self::from_date(today).add_months(-1)
    }

    fn ordinal(self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn add_months(self, n: i32) -> Self {
        Self::from_ordinal(self.ordinal() + n as i64)
    }

    pub fn succ(self) -> Self {
        self.add_months(1)
    }

    /// Number of months from `self` to `other` (negative when `other` is earlier).
    pub fn months_until(self, other: Month) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// Parses `YYYY-MM`, `YYYY-MM-DD` or any timestamp starting with `YYYY-MM-DD`.
    /// The day and time are discarded, collapsing the value onto its month.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let date = match trimmed.len() {
            7 => NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").ok(),
            n if n >= 10 => trimmed
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            _ => None,
        };
        date.map(Self::from_date)
            .ok_or_else(|| ValidationError::Month(value.to_string()))
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-01", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Month::parse(s)
    }
}

/// Anything usable as the inclusive end of [`month_range`].
///
/// An integer `n` means "n months after the start".
pub trait RangeStop {
    fn resolve(self, start: Month) -> Result<Month, ValidationError>;
}

impl RangeStop for Month {
    fn resolve(self, _start: Month) -> Result<Month, ValidationError> {
        Ok(self)
    }
}

impl RangeStop for NaiveDate {
    fn resolve(self, _start: Month) -> Result<Month, ValidationError> {
        Ok(Month::from_date(self))
    }
}

impl RangeStop for &str {
    fn resolve(self, _start: Month) -> Result<Month, ValidationError> {
        Month::parse(self)
    }
}

impl RangeStop for u32 {
    fn resolve(self, start: Month) -> Result<Month, ValidationError> {
        Ok(start.add_months(self as i32))
    }
}

impl RangeStop for i32 {
    fn resolve(self, start: Month) -> Result<Month, ValidationError> {
        Ok(start.add_months(self))
    }
}

/// Inclusive iterator over the months from `start` to `stop`. Empty if `stop < start`.
pub fn months_between(start: Month, stop: Month) -> impl Iterator<Item = Month> {
    let count = start.months_until(stop) + 1;
    (0..count.max(0)).map(move |i| start.add_months(i as i32))
}

/// Inclusive sequence of ISO month-start dates from `start` to `stop`.
///
/// # Examples
///
/// ```
/// use heat_prognosis::month_range;
///
/// let months = month_range("2020-01-01", "2020-03-01").unwrap();
/// assert_eq!(months, ["2020-01-01", "2020-02-01", "2020-03-01"]);
///
/// // An integer stop counts months from the start.
/// assert_eq!(month_range("2020-01-01", 2).unwrap(), months);
/// ```
pub fn month_range(start: &str, stop: impl RangeStop) -> Result<Vec<String>, ValidationError> {
    let start = Month::parse(start)?;
    let stop = stop.resolve(start)?;
    Ok(months_between(start, stop).map(|m| m.to_string()).collect())
}

/// A contiguous, inclusive span of months.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: Month,
    pub end: Month,
}

impl MonthWindow {
    /// The `years`-long window whose last month is `end`.
    pub fn ending_at(end: Month, years: u32) -> Self {
        let span = (years.max(1) * 12) as i32;
        Self {
            start: end.add_months(-(span - 1)),
            end,
        }
    }

    pub fn contains(&self, month: Month) -> bool {
        self.start <= month && month <= self.end
    }

    pub fn months(&self) -> impl Iterator<Item = Month> {
        months_between(self.start, self.end)
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}
