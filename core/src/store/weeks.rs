use super::{get_date, get_enum, get_json, get_ts, ts, PayrollStore};
use crate::{
    error::PayrollResult,
    types::{Platform, WeekId},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    Complete,
    /// At least one platform failed; the others were persisted.
    Partial,
    /// Every submitted platform failed.
    Failed,
}

impl WeekStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekStatus::Complete => "complete",
            WeekStatus::Partial  => "partial",
            WeekStatus::Failed   => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(WeekStatus::Complete),
            "partial"  => Some(WeekStatus::Partial),
            "failed"   => Some(WeekStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollWeek {
    pub week_id: WeekId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: WeekStatus,
    pub failed_platforms: Vec<Platform>,
    pub processed_at: DateTime<Utc>,
}

impl PayrollStore {
    pub fn upsert_week(&self, w: &PayrollWeek) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO payroll_week (week_id, start_date, end_date, status, failed_platforms, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(week_id) DO UPDATE SET
                status = excluded.status,
                failed_platforms = excluded.failed_platforms,
                processed_at = excluded.processed_at",
            params![
                w.week_id,
                w.start.format("%Y-%m-%d").to_string(),
                w.end.format("%Y-%m-%d").to_string(),
                w.status.as_str(),
                serde_json::to_string(&w.failed_platforms)?,
                ts(&w.processed_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_week(&self, week_id: &str) -> PayrollResult<Option<PayrollWeek>> {
        let week = self
            .conn
            .query_row(
                "SELECT week_id, start_date, end_date, status, failed_platforms, processed_at
                 FROM payroll_week WHERE week_id = ?1",
                params![week_id],
                |row| {
                    Ok(PayrollWeek {
                        week_id: row.get(0)?,
                        start: get_date(row, 1)?,
                        end: get_date(row, 2)?,
                        status: get_enum(row, 3, WeekStatus::parse)?,
                        failed_platforms: get_json(row, 4)?,
                        processed_at: get_ts(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(week)
    }

    /// Processed weeks, most recent first.
    pub fn available_weeks(&self) -> PayrollResult<Vec<WeekId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT week_id FROM payroll_week ORDER BY week_id DESC")?;
        let weeks = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(weeks)
    }
}
