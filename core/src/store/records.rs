use super::{dec, get_dec, get_enum, PayrollStore};
use crate::{
    calculator::{DriverWeeklyRecord, WaterfallAmounts},
    error::PayrollResult,
    types::{ContractorType, PaymentStatus, RecordId},
};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) const RECORD_COLUMNS: &str = "id, driver_id, week_id, contractor_type, total_trips,
     ride_a_earnings, ride_b_earnings, gross_ride_earnings, tax_amount,
     earnings_net_of_tax, admin_fee_amount, fuel_expense, toll_expense,
     rental_expense, financing_installment, net_payout,
     toll_deducted, payment_status, payment_info";

impl PayrollStore {
    /// Write a freshly computed record. Paid and cancelled rows are left
    /// untouched; returns false when the stored row was frozen.
    pub fn upsert_pending_record(&self, r: &DriverWeeklyRecord) -> PayrollResult<bool> {
        let a = &r.amounts;
        let changed = self.conn.execute(
            "INSERT INTO weekly_record (
                id, driver_id, week_id, contractor_type, total_trips,
                ride_a_earnings, ride_b_earnings, gross_ride_earnings, tax_amount,
                earnings_net_of_tax, admin_fee_amount, fuel_expense, toll_expense,
                rental_expense, financing_installment, net_payout,
                toll_deducted, payment_status, payment_info, superseded
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, 'pending', NULL, 0)
             ON CONFLICT(id) DO UPDATE SET
                contractor_type = excluded.contractor_type,
                total_trips = excluded.total_trips,
                ride_a_earnings = excluded.ride_a_earnings,
                ride_b_earnings = excluded.ride_b_earnings,
                gross_ride_earnings = excluded.gross_ride_earnings,
                tax_amount = excluded.tax_amount,
                earnings_net_of_tax = excluded.earnings_net_of_tax,
                admin_fee_amount = excluded.admin_fee_amount,
                fuel_expense = excluded.fuel_expense,
                toll_expense = excluded.toll_expense,
                rental_expense = excluded.rental_expense,
                financing_installment = excluded.financing_installment,
                net_payout = excluded.net_payout,
                toll_deducted = excluded.toll_deducted,
                superseded = 0
             WHERE weekly_record.payment_status = 'pending'",
            params![
                r.id,
                r.driver_id,
                r.week_id,
                r.contractor_type.as_str(),
                r.total_trips as i64,
                dec(&a.ride_a_earnings),
                dec(&a.ride_b_earnings),
                dec(&a.gross_ride_earnings),
                dec(&a.tax_amount),
                dec(&a.earnings_net_of_tax),
                dec(&a.admin_fee_amount),
                dec(&a.fuel_expense),
                dec(&a.toll_expense),
                dec(&a.rental_expense),
                dec(&a.financing_installment),
                dec(&a.net_payout),
                r.toll_deducted,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Mark pending records of the week that are not in `current` as
    /// superseded. Returns the ids that changed.
    pub fn supersede_stale_records(
        &self,
        week_id: &str,
        current: &[RecordId],
    ) -> PayrollResult<Vec<RecordId>> {
        self.write_tx(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM weekly_record
                 WHERE week_id = ?1 AND payment_status = 'pending' AND superseded = 0
                 ORDER BY id ASC",
            )?;
            let stale: Vec<RecordId> = stmt
                .query_map(params![week_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|id| !current.contains(id))
                .collect();
            for id in &stale {
                conn.execute(
                    "UPDATE weekly_record SET superseded = 1 WHERE id = ?1",
                    params![id],
                )?;
            }
            Ok(stale)
        })
    }

    /// Raw stored rows, not merged with the ledger. Superseded rows excluded.
    pub fn stored_week_records(&self, week_id: Option<&str>) -> PayrollResult<Vec<DriverWeeklyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM weekly_record
             WHERE superseded = 0 AND (?1 IS NULL OR week_id = ?1)
             ORDER BY week_id ASC, driver_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![week_id], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub(super) fn load_record(conn: &Connection, record_id: &str) -> PayrollResult<Option<DriverWeeklyRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM weekly_record WHERE id = ?1 AND superseded = 0"),
            params![record_id],
            map_record,
        )
        .optional()?;
    Ok(record)
}

pub(super) fn map_record(row: &Row<'_>) -> rusqlite::Result<DriverWeeklyRecord> {
    let payment_info: Option<String> = row.get(18)?;
    let payment_info = payment_info
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| super::conversion_error(18, format!("payment_info: {e}")))?;

    Ok(DriverWeeklyRecord {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        week_id: row.get(2)?,
        contractor_type: get_enum(row, 3, ContractorType::parse)?,
        total_trips: row.get::<_, i64>(4)? as u64,
        amounts: WaterfallAmounts {
            ride_a_earnings: get_dec(row, 5)?,
            ride_b_earnings: get_dec(row, 6)?,
            gross_ride_earnings: get_dec(row, 7)?,
            tax_amount: get_dec(row, 8)?,
            earnings_net_of_tax: get_dec(row, 9)?,
            admin_fee_amount: get_dec(row, 10)?,
            fuel_expense: get_dec(row, 11)?,
            toll_expense: get_dec(row, 12)?,
            rental_expense: get_dec(row, 13)?,
            financing_installment: get_dec(row, 14)?,
            net_payout: get_dec(row, 15)?,
        },
        toll_deducted: row.get(16)?,
        payment_status: get_enum(row, 17, PaymentStatus::parse)?,
        payment_info,
    })
}
