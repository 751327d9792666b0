use super::{dec, get_dec, get_enum, PayrollStore};
use crate::{
    error::PayrollResult,
    roster::{Driver, FinancingAgreement, FinancingStatus},
    types::{ContractorType, DriverStatus, Platform},
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const DRIVER_COLUMNS: &str =
    "id, name, contractor_type, rental_fee_per_week, vehicle_plate, referred_by, status";

const FINANCING_COLUMNS: &str = "id, driver_id, principal, weekly_installment,
     weekly_interest_percent, remaining_weeks, status";

impl PayrollStore {
    // ── Drivers ───────────────────────────────────────────────────

    /// Insert or update a driver and replace its integrations.
    pub fn upsert_driver(&self, d: &Driver) -> PayrollResult<()> {
        self.write_tx(|conn| {
            conn.execute(
                "INSERT INTO driver (id, name, contractor_type, rental_fee_per_week,
                                     vehicle_plate, referred_by, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    contractor_type = excluded.contractor_type,
                    rental_fee_per_week = excluded.rental_fee_per_week,
                    vehicle_plate = excluded.vehicle_plate,
                    referred_by = excluded.referred_by,
                    status = excluded.status",
                params![
                    d.id,
                    d.name,
                    d.contractor_type.as_str(),
                    dec(&d.rental_fee_per_week),
                    d.vehicle_plate,
                    d.referred_by,
                    d.status.as_str(),
                ],
            )?;
            conn.execute(
                "DELETE FROM driver_integration WHERE driver_id = ?1",
                params![d.id],
            )?;
            for (platform, reference) in &d.integrations {
                conn.execute(
                    "INSERT INTO driver_integration (driver_id, platform, reference_id)
                     VALUES (?1, ?2, ?3)",
                    params![d.id, platform.as_str(), reference],
                )?;
            }
            Ok(())
        })
    }

    pub fn get_driver(&self, driver_id: &str) -> PayrollResult<Option<Driver>> {
        load_driver(&self.conn, driver_id)
    }

    /// The whole roster, active and inactive, by id.
    pub fn drivers(&self) -> PayrollResult<Vec<Driver>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DRIVER_COLUMNS} FROM driver ORDER BY id ASC"))?;
        let mut drivers = stmt
            .query_map([], map_driver)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT driver_id, platform, reference_id FROM driver_integration",
        )?;
        let mut integrations: BTreeMap<String, BTreeMap<Platform, String>> = BTreeMap::new();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    get_enum(row, 1, Platform::parse)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (driver_id, platform, reference) in rows {
            integrations.entry(driver_id).or_default().insert(platform, reference);
        }
        for d in &mut drivers {
            d.integrations = integrations.remove(&d.id).unwrap_or_default();
        }
        Ok(drivers)
    }

    pub fn set_driver_status(&self, driver_id: &str, status: DriverStatus) -> PayrollResult<()> {
        self.conn.execute(
            "UPDATE driver SET status = ?2 WHERE id = ?1",
            params![driver_id, status.as_str()],
        )?;
        Ok(())
    }

    // ── Financing ─────────────────────────────────────────────────

    pub fn upsert_financing(&self, f: &FinancingAgreement) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO financing_agreement (id, driver_id, principal, weekly_installment,
                                              weekly_interest_percent, remaining_weeks, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                principal = excluded.principal,
                weekly_installment = excluded.weekly_installment,
                weekly_interest_percent = excluded.weekly_interest_percent,
                remaining_weeks = excluded.remaining_weeks,
                status = excluded.status",
            params![
                f.id,
                f.driver_id,
                dec(&f.principal),
                dec(&f.weekly_installment),
                dec(&f.weekly_interest_percent),
                f.remaining_weeks,
                f.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn financing_for_driver(&self, driver_id: &str) -> PayrollResult<Vec<FinancingAgreement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINANCING_COLUMNS} FROM financing_agreement
             WHERE driver_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![driver_id], map_financing)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Agreements still charging installments, across all drivers.
    pub fn active_financing(&self) -> PayrollResult<Vec<FinancingAgreement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINANCING_COLUMNS} FROM financing_agreement
             WHERE status = 'active' AND remaining_weeks > 0
             ORDER BY driver_id ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([], map_financing)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub(super) fn load_driver(conn: &Connection, driver_id: &str) -> PayrollResult<Option<Driver>> {
    let driver = conn
        .query_row(
            &format!("SELECT {DRIVER_COLUMNS} FROM driver WHERE id = ?1"),
            params![driver_id],
            map_driver,
        )
        .optional()?;
    let Some(mut driver) = driver else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT platform, reference_id FROM driver_integration WHERE driver_id = ?1",
    )?;
    driver.integrations = stmt
        .query_map(params![driver_id], |row| {
            Ok((get_enum(row, 0, Platform::parse)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(Some(driver))
}

/// Move every active agreement of the driver one week forward.
/// Returns the ids that moved so the step can be undone.
pub(super) fn advance_financing(conn: &Connection, driver_id: &str) -> PayrollResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM financing_agreement
         WHERE driver_id = ?1 AND status = 'active' AND remaining_weeks > 0
         ORDER BY id ASC",
    )?;
    let ids = stmt
        .query_map(params![driver_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for id in &ids {
        conn.execute(
            "UPDATE financing_agreement
             SET remaining_weeks = remaining_weeks - 1,
                 status = CASE WHEN remaining_weeks - 1 = 0 THEN 'completed' ELSE status END
             WHERE id = ?1",
            params![id],
        )?;
    }
    Ok(ids)
}

pub(super) fn revert_financing(conn: &Connection, ids: &[String]) -> PayrollResult<()> {
    for id in ids {
        conn.execute(
            "UPDATE financing_agreement
             SET remaining_weeks = remaining_weeks + 1, status = 'active'
             WHERE id = ?1",
            params![id],
        )?;
    }
    Ok(())
}

fn map_driver(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: row.get(0)?,
        name: row.get(1)?,
        contractor_type: get_enum(row, 2, ContractorType::parse)?,
        rental_fee_per_week: get_dec(row, 3)?,
        integrations: BTreeMap::new(),
        vehicle_plate: row.get(4)?,
        referred_by: row.get(5)?,
        status: get_enum(row, 6, DriverStatus::parse)?,
    })
}

fn map_financing(row: &Row<'_>) -> rusqlite::Result<FinancingAgreement> {
    Ok(FinancingAgreement {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        principal: get_dec(row, 2)?,
        weekly_installment: get_dec(row, 3)?,
        weekly_interest_percent: get_dec(row, 4)?,
        remaining_weeks: row.get(5)?,
        status: get_enum(row, 6, FinancingStatus::parse)?,
    })
}
