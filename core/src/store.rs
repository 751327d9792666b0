//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods or the repository traits it implements,
//! they never execute SQL directly.
//!
//! Money is stored as decimal strings, timestamps as RFC 3339 text.

use crate::{
    error::PayrollResult,
    event::AuditLogEntry,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;

mod entries;
mod goals;
mod ledger;
mod records;
mod referral;
mod roster;
mod weeks;

pub use weeks::{PayrollWeek, WeekStatus};

pub struct PayrollStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PayrollStore {
    pub fn open(path: &str) -> PayrollResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PayrollResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same database.
    /// For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> PayrollResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run more than once.
    pub fn migrate(&self) -> PayrollResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_roster.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_weekly_data.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/004_payment_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/005_referral.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/006_goals_performance.sql"))?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so a concurrent writer on another
    /// connection waits (up to the busy timeout) instead of interleaving its
    /// read with ours. Any error rolls back.
    pub(crate) fn write_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> PayrollResult<T>,
    ) -> PayrollResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_audit(&self, entry: &AuditLogEntry) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (week_id, component, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.week_id,
                entry.component,
                entry.event_type,
                entry.payload,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Audit rows in insertion order, optionally limited to one week.
    pub fn audit_log(&self, week_id: Option<&str>) -> PayrollResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, week_id, component, event_type, payload, created_at
             FROM audit_log
             WHERE ?1 IS NULL OR week_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![week_id], |row| {
                Ok(AuditLogEntry {
                    id: Some(row.get(0)?),
                    week_id: row.get(1)?,
                    component: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Column codecs ─────────────────────────────────────────────────

pub(crate) fn dec(value: &Decimal) -> String {
    value.to_string()
}

pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn get_dec(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, format!("decimal '{raw}': {e}")))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("timestamp '{raw}': {e}")))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, format!("timestamp '{raw}': {e}")))
    })
    .transpose()
}

pub(crate) fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("date '{raw}': {e}")))
}

/// Read a text column through an enum's `parse`.
pub(crate) fn get_enum<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown value '{raw}'")))
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, format!("json: {e}")))
}
