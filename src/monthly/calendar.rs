use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{Datelike, Duration as Days, NaiveDate, Weekday};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::FxError;

/// Weekday business days adjusted by explicit holidays and make-up workdays.
///
/// A holiday always wins; a weekend day only counts when listed as a workday.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessCalendar {
    holidays: BTreeSet<NaiveDate>,
    workdays: BTreeSet<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarFile {
    #[serde(default)]
    holidays: Vec<NaiveDate>,
    #[serde(default)]
    workdays: Vec<NaiveDate>,
}

impl BusinessCalendar {
    pub fn new<H, W>(holidays: H, workdays: W) -> Self
    where
        H: IntoIterator<Item = NaiveDate>,
        W: IntoIterator<Item = NaiveDate>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
            workdays: workdays.into_iter().collect(),
        }
    }

    /// Parse `holidays = ["YYYY-MM-DD", ...]` and `workdays = [...]`; both keys optional.
    pub fn from_toml_str(text: &str) -> Result<Self, FxError> {
        let file: CalendarFile =
            toml::from_str(text).map_err(|e| FxError::Calendar(format!("calendar parse: {e}")))?;
        Ok(Self::new(file.holidays, file.workdays))
    }

    /// Load overrides from a TOML file. A missing file is an empty calendar.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, FxError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "calendar file missing; using weekday calendar");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let calendar = Self::from_toml_str(&text)?;
        debug!(
            path = %path.display(),
            holidays = calendar.holidays.len(),
            workdays = calendar.workdays.len(),
            "calendar loaded"
        );
        Ok(calendar)
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn workdays(&self) -> &BTreeSet<NaiveDate> {
        &self.workdays
    }

    pub fn is_business_day(&self, day: NaiveDate) -> bool {
        if self.holidays.contains(&day) {
            return false;
        }
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            return self.workdays.contains(&day);
        }
        true
    }

    /// Earliest business day of the month.
    ///
    /// Fails with [`FxError::Config`] when the overrides leave the month without one.
    pub fn first_business_day(&self, year: i32, month: u32) -> Result<NaiveDate, FxError> {
        let (first, last) = month_bounds(year, month)?;
        first
            .iter_days()
            .take_while(|d| *d <= last)
            .find(|d| self.is_business_day(*d))
            .ok_or_else(|| FxError::Config(format!("No business day found for {year}-{month:02}")))
    }
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), FxError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FxError::Config(format!("invalid month {year}-{month:02}")))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| FxError::Config(format!("invalid month {year}-{month:02}")))?;
    Ok((first, next - Days::days(1)))
}

/// `(year, month)` pairs from `start`'s month through `end`'s month, inclusive.
pub fn iter_months(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let mut cursor = Some((start.year(), start.month()));
    let terminal = (end.year(), end.month());
    std::iter::from_fn(move || {
        let current = cursor.filter(|c| *c <= terminal)?;
        let (year, month) = current;
        cursor = Some(if month == 12 { (year + 1, 1) } else { (year, month + 1) });
        Some(current)
    })
}
