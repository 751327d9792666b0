use super::{
    dec, get_dec, get_enum, get_json, get_ts,
    records::load_record,
    roster::{advance_financing, revert_financing},
    ts, PayrollStore,
};
use crate::{
    calculator::DriverWeeklyRecord,
    error::{PayrollError, PayrollResult},
    ledger::{transition_error, LedgerRepository, LedgerStatus, PaymentInfo, PaymentLedgerEntry},
    types::PaymentStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const LEDGER_COLUMNS: &str = "ledger_id, record_id, driver_id, week_id, amount, paid_at,
     proof_ref, breakdown, status, void_reason, advanced_financing";

impl PayrollStore {
    /// Bring in a payment made outside this system, e.g. from an older
    /// ledger. A pending record it points at is frozen with whatever
    /// breakdown the entry carries. Entries whose record does not exist are
    /// stored as-is and show up as dangling in the integrity report.
    pub fn import_ledger_entry(&self, entry: &PaymentLedgerEntry) -> PayrollResult<()> {
        self.write_tx(|conn| {
            let record = load_record(conn, &entry.record_id)?;
            if let Some(record) = &record {
                if record.payment_status != PaymentStatus::Pending {
                    return Err(transition_error(
                        &record.id,
                        record.payment_status,
                        PaymentStatus::Paid,
                    ));
                }
            }
            insert_ledger(conn, entry, &[])?;
            if record.is_some() && entry.status == LedgerStatus::Active {
                let info = PaymentInfo {
                    ledger_id: entry.ledger_id.clone(),
                    paid_at: entry.paid_at,
                    proof_ref: entry.proof_ref.clone(),
                    amount: entry.amount,
                    snapshot: entry.breakdown,
                };
                conn.execute(
                    "UPDATE weekly_record SET payment_status = 'paid', payment_info = ?2
                     WHERE id = ?1",
                    params![entry.record_id, serde_json::to_string(&info)?],
                )?;
            }
            Ok(())
        })
    }

    /// Every ledger entry of a record, active or voided, oldest first.
    pub fn ledger_history(&self, record_id: &str) -> PayrollResult<Vec<PaymentLedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM payment_ledger
             WHERE record_id = ?1 ORDER BY paid_at ASC, ledger_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![record_id], map_ledger_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LedgerRepository for PayrollStore {
    fn get_record(&self, record_id: &str) -> PayrollResult<Option<DriverWeeklyRecord>> {
        load_record(&self.conn, record_id)
    }

    fn freeze_record<F>(&self, record_id: &str, build: F) -> PayrollResult<PaymentLedgerEntry>
    where
        F: FnOnce(&DriverWeeklyRecord) -> (PaymentLedgerEntry, PaymentInfo),
    {
        self.write_tx(|conn| {
            let record = load_record(conn, record_id)?.ok_or_else(|| {
                PayrollError::RecordNotFound { record_id: record_id.to_string() }
            })?;
            if record.payment_status != PaymentStatus::Pending {
                return Err(transition_error(
                    record_id,
                    record.payment_status,
                    PaymentStatus::Paid,
                ));
            }

            let (mut entry, info) = build(&record);
            let advanced = if entry.financing_advanced {
                advance_financing(conn, &record.driver_id)?
            } else {
                Vec::new()
            };
            entry.financing_advanced = !advanced.is_empty();
            insert_ledger(conn, &entry, &advanced)?;

            // Compare-and-set on the status the write lock already protects.
            let changed = conn.execute(
                "UPDATE weekly_record SET payment_status = 'paid', payment_info = ?2
                 WHERE id = ?1 AND payment_status = 'pending'",
                params![record_id, serde_json::to_string(&info)?],
            )?;
            if changed != 1 {
                return Err(transition_error(record_id, record.payment_status, PaymentStatus::Paid));
            }
            Ok(entry)
        })
    }

    fn cancel_record(&self, record_id: &str, reason: &str) -> PayrollResult<PaymentStatus> {
        self.write_tx(|conn| {
            let record = load_record(conn, record_id)?.ok_or_else(|| {
                PayrollError::RecordNotFound { record_id: record_id.to_string() }
            })?;
            if record.payment_status == PaymentStatus::Cancelled {
                return Err(transition_error(
                    record_id,
                    PaymentStatus::Cancelled,
                    PaymentStatus::Cancelled,
                ));
            }
            if let Some(entry) = load_active_ledger(conn, record_id)? {
                void_ledger(conn, &entry.ledger_id, reason)?;
            }
            conn.execute(
                "UPDATE weekly_record SET payment_status = 'cancelled' WHERE id = ?1",
                params![record_id],
            )?;
            Ok(record.payment_status)
        })
    }

    fn reopen_record(&self, record_id: &str, reason: &str) -> PayrollResult<String> {
        self.write_tx(|conn| {
            let record = load_record(conn, record_id)?.ok_or_else(|| {
                PayrollError::RecordNotFound { record_id: record_id.to_string() }
            })?;
            if record.payment_status != PaymentStatus::Paid {
                return Err(transition_error(
                    record_id,
                    record.payment_status,
                    PaymentStatus::Pending,
                ));
            }
            let entry = load_active_ledger(conn, record_id)?.ok_or_else(|| {
                PayrollError::LedgerNotFound { record_id: record_id.to_string() }
            })?;
            void_ledger(conn, &entry.ledger_id, reason)?;
            conn.execute(
                "UPDATE weekly_record SET payment_status = 'pending', payment_info = NULL
                 WHERE id = ?1",
                params![record_id],
            )?;
            Ok(entry.ledger_id)
        })
    }

    fn active_ledger_entry(&self, record_id: &str) -> PayrollResult<Option<PaymentLedgerEntry>> {
        load_active_ledger(&self.conn, record_id)
    }

    fn active_ledger_entries(&self, week_id: Option<&str>) -> PayrollResult<Vec<PaymentLedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM payment_ledger
             WHERE status = 'active' AND (?1 IS NULL OR week_id = ?1)
             ORDER BY ledger_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![week_id], map_ledger_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn stored_records(&self, week_id: Option<&str>) -> PayrollResult<Vec<DriverWeeklyRecord>> {
        self.stored_week_records(week_id)
    }
}

fn insert_ledger(conn: &Connection, e: &PaymentLedgerEntry, advanced: &[String]) -> PayrollResult<()> {
    conn.execute(
        "INSERT INTO payment_ledger
         (ledger_id, record_id, driver_id, week_id, amount, paid_at, proof_ref,
          breakdown, status, void_reason, advanced_financing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            e.ledger_id,
            e.record_id,
            e.driver_id,
            e.week_id,
            dec(&e.amount),
            ts(&e.paid_at),
            e.proof_ref,
            serde_json::to_string(&e.breakdown)?,
            e.status.as_str(),
            e.void_reason,
            serde_json::to_string(advanced)?,
        ],
    )?;
    Ok(())
}

fn load_active_ledger(conn: &Connection, record_id: &str) -> PayrollResult<Option<PaymentLedgerEntry>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {LEDGER_COLUMNS} FROM payment_ledger
                 WHERE record_id = ?1 AND status = 'active'"
            ),
            params![record_id],
            map_ledger_entry,
        )
        .optional()?;
    Ok(entry)
}

/// Void an entry and undo any financing step it took.
fn void_ledger(conn: &Connection, ledger_id: &str, reason: &str) -> PayrollResult<()> {
    let advanced: String = conn.query_row(
        "SELECT advanced_financing FROM payment_ledger WHERE ledger_id = ?1",
        params![ledger_id],
        |row| row.get(0),
    )?;
    let advanced: Vec<String> = serde_json::from_str(&advanced)?;
    revert_financing(conn, &advanced)?;
    conn.execute(
        "UPDATE payment_ledger SET status = 'voided', void_reason = ?2 WHERE ledger_id = ?1",
        params![ledger_id, reason],
    )?;
    Ok(())
}

fn map_ledger_entry(row: &Row<'_>) -> rusqlite::Result<PaymentLedgerEntry> {
    let advanced: Vec<String> = get_json(row, 10)?;
    Ok(PaymentLedgerEntry {
        ledger_id: row.get(0)?,
        record_id: row.get(1)?,
        driver_id: row.get(2)?,
        week_id: row.get(3)?,
        amount: get_dec(row, 4)?,
        paid_at: get_ts(row, 5)?,
        proof_ref: row.get(6)?,
        breakdown: get_json(row, 7)?,
        status: get_enum(row, 8, LedgerStatus::parse)?,
        void_reason: row.get(9)?,
        financing_advanced: !advanced.is_empty(),
    })
}
