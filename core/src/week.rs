//! Weekly windows. Every payroll run covers one ISO week, Monday to Sunday.

use crate::{
    error::{PayrollError, PayrollResult},
    types::WeekId,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub week_id: WeekId,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// The ISO week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            week_id: format!("{}-W{:02}", iso.year(), iso.week()),
            start,
            end: start + Duration::days(6),
        }
    }

    /// Parse a `YYYY-Www` identifier.
    pub fn parse(week_id: &str) -> PayrollResult<Self> {
        let invalid = || PayrollError::InvalidWeek(week_id.to_string());
        let (year, week) = week_id.split_once("-W").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
        Ok(Self::containing(start))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn previous(&self) -> Self {
        Self::containing(self.start - Duration::days(7))
    }
}
