use super::{dec, get_dec, get_enum, PayrollStore};
use crate::{
    error::PayrollResult,
    normalizer::NormalizedWeeklyEntry,
    types::Platform,
};
use rusqlite::params;

impl PayrollStore {
    /// Atomically replace every entry of one (week, platform) partition.
    /// On failure the previous entries are left intact.
    pub fn replace_partition(
        &self,
        week_id: &str,
        platform: Platform,
        entries: &[NormalizedWeeklyEntry],
    ) -> PayrollResult<usize> {
        self.write_tx(|conn| {
            let removed = conn.execute(
                "DELETE FROM normalized_entry WHERE week_id = ?1 AND platform = ?2",
                params![week_id, platform.as_str()],
            )?;
            let mut stmt = conn.prepare(
                "INSERT INTO normalized_entry
                 (week_id, platform, reference_id, seq, reference_label, driver_id,
                  total_value, total_trips, source_ref, row_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for (seq, e) in entries.iter().enumerate() {
                stmt.execute(params![
                    week_id,
                    platform.as_str(),
                    e.reference_id,
                    seq as i64,
                    e.reference_label,
                    e.driver_id,
                    dec(&e.total_value),
                    e.total_trips as i64,
                    e.source_ref,
                    e.row_count,
                ])?;
            }
            log::debug!(
                "partition {week_id}/{platform}: replaced {removed} entries with {}",
                entries.len()
            );
            Ok(entries.len())
        })
    }

    /// Every stored entry of a week, by platform then first-seen order.
    pub fn week_entries(&self, week_id: &str) -> PayrollResult<Vec<NormalizedWeeklyEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT week_id, platform, reference_id, reference_label, driver_id,
                    total_value, total_trips, source_ref, row_count
             FROM normalized_entry
             WHERE week_id = ?1
             ORDER BY platform ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map(params![week_id], |row| {
                Ok(NormalizedWeeklyEntry {
                    week_id: row.get(0)?,
                    platform: get_enum(row, 1, Platform::parse)?,
                    reference_id: row.get(2)?,
                    reference_label: row.get(3)?,
                    driver_id: row.get(4)?,
                    total_value: get_dec(row, 5)?,
                    total_trips: row.get::<_, i64>(6)? as u64,
                    source_ref: row.get(7)?,
                    row_count: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_entries(&self, week_id: &str, platform: Platform) -> PayrollResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM normalized_entry WHERE week_id = ?1 AND platform = ?2",
            params![week_id, platform.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
