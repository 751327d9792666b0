//! Raw data normalizer: turns per-platform export rows into one
//! NormalizedWeeklyEntry per (week, platform, reference key).
//!
//! Each platform has a strategy naming the accepted column aliases for every
//! logical field, in priority order. The first non-empty match wins.
//!
//! Skipped rows are counted, never raised. Only a file that cannot be read
//! as rows at all fails the platform.

use crate::{
    error::{PayrollError, PayrollResult},
    money::{parse_amount_cell, parse_trips, AmountCell},
    types::{DriverId, Platform, WeekId},
    week::WeekWindow,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One untyped row as delivered by a platform export.
pub type RawRow = Map<String, Value>;

/// Rows for one platform and one week, as handed over by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformBatch {
    pub platform: Platform,
    /// Traceability to the raw import (file name, export id, ...).
    pub source_ref: String,
    pub rows: Vec<Value>,
}

impl PlatformBatch {
    /// Fold batches that share a platform into one, in first-seen platform
    /// order. Rows keep their order and source refs are joined with `+`, so
    /// an export split across several files is imported as a whole.
    pub fn merge_by_platform(batches: &[PlatformBatch]) -> Vec<PlatformBatch> {
        let mut merged: Vec<PlatformBatch> = Vec::with_capacity(batches.len());
        for batch in batches {
            match merged.iter_mut().find(|m| m.platform == batch.platform) {
                Some(existing) => {
                    log::info!(
                        "platform={} merging {} into {}",
                        batch.platform,
                        batch.source_ref,
                        existing.source_ref
                    );
                    existing.source_ref.push('+');
                    existing.source_ref.push_str(&batch.source_ref);
                    existing.rows.extend(batch.rows.iter().cloned());
                }
                None => merged.push(batch.clone()),
            }
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWeeklyEntry {
    pub week_id: WeekId,
    pub platform: Platform,
    pub reference_id: String,
    pub reference_label: Option<String>,
    /// Set when the source row already carried an internal driver id.
    pub driver_id: Option<DriverId>,
    pub total_value: Decimal,
    pub total_trips: u64,
    pub source_ref: String,
    pub row_count: u32,
}

/// Result of normalizing one platform batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub entries: Vec<NormalizedWeeklyEntry>,
    pub rows_read: usize,
    pub missing_reference: usize,
    pub unparsable_amount: usize,
    /// Aggregates that summed below zero and were clamped.
    pub clamped: usize,
}

impl NormalizedBatch {
    pub fn skipped_rows(&self) -> usize {
        self.missing_reference + self.unparsable_amount
    }
}

// ── Strategies ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    DriverId,
    ReferenceId,
    ReferenceLabel,
    Amount,
    Trips,
}

const DRIVER_ID_ALIASES: &[&str] = &["driver_id", "internal_driver_id", "id_motorista"];

pub trait PlatformStrategy: Send + Sync {
    fn platform(&self) -> Platform;

    /// Accepted source column names for `field`, highest priority first.
    fn aliases(&self, field: LogicalField) -> &'static [&'static str];

    /// Canonical aggregation key for a raw reference value.
    fn reference_key(&self, raw: &str) -> String {
        if self.platform().is_plate_keyed() {
            normalize_plate(raw)
        } else {
            raw.trim().to_lowercase()
        }
    }
}

pub struct RideAStrategy;
pub struct RideBStrategy;
pub struct FuelCardStrategy;
pub struct TollTagStrategy;
pub struct TelemetryStrategy;

impl PlatformStrategy for RideAStrategy {
    fn platform(&self) -> Platform {
        Platform::RideA
    }

    fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::DriverId => DRIVER_ID_ALIASES,
            LogicalField::ReferenceId => &[
                "driver_uuid",
                "UUID do motorista",
                "uuid",
                "driver_email",
                "email",
            ],
            LogicalField::ReferenceLabel => &["driver_name", "Nome do motorista", "name"],
            LogicalField::Amount => &[
                "total_earnings",
                "Pago a si",
                "Ganhos totais",
                "earnings",
                "amount",
            ],
            LogicalField::Trips => &["trips", "Viagens concluídas", "trip_count"],
        }
    }
}

impl PlatformStrategy for RideBStrategy {
    fn platform(&self) -> Platform {
        Platform::RideB
    }

    fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::DriverId => DRIVER_ID_ALIASES,
            LogicalField::ReferenceId => &[
                "driver_email",
                "email",
                "Identificador do motorista",
                "driver_ref",
            ],
            LogicalField::ReferenceLabel => &["Motorista", "driver_name", "name"],
            LogicalField::Amount => &[
                "net_earnings",
                "Ganhos líquidos",
                "Ganhos líquidos|€",
                "total",
                "amount",
            ],
            LogicalField::Trips => &["finished_rides", "Viagens terminadas", "trips"],
        }
    }
}

impl PlatformStrategy for FuelCardStrategy {
    fn platform(&self) -> Platform {
        Platform::FuelCard
    }

    fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::DriverId => DRIVER_ID_ALIASES,
            LogicalField::ReferenceId => &["card_number", "Nº Cartão", "Cartão", "card"],
            LogicalField::ReferenceLabel => &["holder", "Condutor", "driver_name"],
            LogicalField::Amount => &["total_value", "Valor", "Total", "amount"],
            LogicalField::Trips => &[],
        }
    }
}

impl PlatformStrategy for TollTagStrategy {
    fn platform(&self) -> Platform {
        Platform::TollTag
    }

    fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::DriverId => DRIVER_ID_ALIASES,
            LogicalField::ReferenceId => &["license_plate", "Matrícula", "plate", "matricula"],
            LogicalField::ReferenceLabel => &["tag_id", "Identificador"],
            LogicalField::Amount => &["value", "Valor", "Importância", "amount"],
            LogicalField::Trips => &[],
        }
    }
}

impl PlatformStrategy for TelemetryStrategy {
    fn platform(&self) -> Platform {
        Platform::Telemetry
    }

    /// Telemetry "amount" is active hours, not money.
    fn aliases(&self, field: LogicalField) -> &'static [&'static str] {
        match field {
            LogicalField::DriverId => DRIVER_ID_ALIASES,
            LogicalField::ReferenceId => &["vehicle_plate", "Matrícula", "plate", "license_plate"],
            LogicalField::ReferenceLabel => &["vehicle", "Viatura"],
            LogicalField::Amount => &[
                "active_hours",
                "driving_hours",
                "Horas de condução",
                "engine_hours",
            ],
            LogicalField::Trips => &["trips", "Viagens"],
        }
    }
}

pub fn strategy_for(platform: Platform) -> &'static dyn PlatformStrategy {
    match platform {
        Platform::RideA     => &RideAStrategy,
        Platform::RideB     => &RideBStrategy,
        Platform::FuelCard  => &FuelCardStrategy,
        Platform::TollTag   => &TollTagStrategy,
        Platform::Telemetry => &TelemetryStrategy,
    }
}

/// Lower-case and strip everything but ASCII letters and digits.
/// `"AA-12-BB"`, `"aa 12 bb"` and `"AA12BB"` share one key.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// First non-empty cell among `aliases`, matching headers case-insensitively.
fn lookup<'r>(row: &'r RawRow, aliases: &[&str]) -> Option<&'r Value> {
    aliases.iter().find_map(|alias| {
        row.iter()
            .find(|(k, v)| k.trim().eq_ignore_ascii_case(alias) && !is_blank(v))
            .map(|(_, v)| v)
    })
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

// ── Accumulator ───────────────────────────────────────────────────

/// Arena of entries plus an index by reference key, built fresh per run.
struct EntryAccumulator {
    arena: Vec<NormalizedWeeklyEntry>,
    index: HashMap<(WeekId, Platform, String), usize>,
}

impl EntryAccumulator {
    fn new() -> Self {
        Self { arena: Vec::new(), index: HashMap::new() }
    }

    fn slot(&mut self, template: NormalizedWeeklyEntry) -> &mut NormalizedWeeklyEntry {
        let key = (
            template.week_id.clone(),
            template.platform,
            template.reference_id.clone(),
        );
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.arena.push(template);
                let idx = self.arena.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };
        &mut self.arena[idx]
    }

    fn into_entries(self) -> Vec<NormalizedWeeklyEntry> {
        self.arena
    }
}

// ── Normalizer ────────────────────────────────────────────────────

pub struct Normalizer {
    window: WeekWindow,
}

impl Normalizer {
    pub fn new(window: WeekWindow) -> Self {
        Self { window }
    }

    pub fn normalize(&self, batch: &PlatformBatch) -> PayrollResult<NormalizedBatch> {
        let strategy = strategy_for(batch.platform);
        let mut out = NormalizedBatch::default();
        let mut acc = EntryAccumulator::new();
        let mut recognised_any = false;

        for (i, value) in batch.rows.iter().enumerate() {
            let row = value.as_object().ok_or_else(|| PayrollError::PlatformParse {
                platform: batch.platform,
                message: format!("row {i} is not an object"),
            })?;
            out.rows_read += 1;

            let known = [
                LogicalField::ReferenceId,
                LogicalField::Amount,
                LogicalField::Trips,
            ];
            if known.iter().any(|f| lookup(row, strategy.aliases(*f)).is_some()) {
                recognised_any = true;
            }

            let Some(reference) = lookup(row, strategy.aliases(LogicalField::ReferenceId))
                .map(cell_text)
                .map(|raw| strategy.reference_key(&raw))
                .filter(|key| !key.is_empty())
            else {
                out.missing_reference += 1;
                continue;
            };

            let amount = match parse_amount_cell(lookup(row, strategy.aliases(LogicalField::Amount))) {
                AmountCell::Parsed(v) => v,
                AmountCell::Missing => Decimal::ZERO,
                AmountCell::Invalid => {
                    out.unparsable_amount += 1;
                    continue;
                }
            };
            let trips = parse_trips(lookup(row, strategy.aliases(LogicalField::Trips)));
            let label = lookup(row, strategy.aliases(LogicalField::ReferenceLabel)).map(cell_text);
            let driver_id = lookup(row, strategy.aliases(LogicalField::DriverId)).map(cell_text);

            let entry = acc.slot(NormalizedWeeklyEntry {
                week_id: self.window.week_id.clone(),
                platform: batch.platform,
                reference_id: reference,
                reference_label: None,
                driver_id: None,
                total_value: Decimal::ZERO,
                total_trips: 0,
                source_ref: batch.source_ref.clone(),
                row_count: 0,
            });
            entry.total_value += amount;
            entry.total_trips += trips;
            entry.row_count += 1;
            if entry.reference_label.is_none() {
                entry.reference_label = label;
            }
            if entry.driver_id.is_none() {
                entry.driver_id = driver_id;
            }
        }

        if out.rows_read > 0 && !recognised_any {
            return Err(PayrollError::PlatformParse {
                platform: batch.platform,
                message: "no recognised columns in any row".into(),
            });
        }

        let mut entries = acc.into_entries();
        for entry in &mut entries {
            if entry.total_value.is_sign_negative() && !entry.total_value.is_zero() {
                log::warn!(
                    "{} {}: aggregate {} below zero, clamped",
                    entry.platform,
                    entry.reference_id,
                    entry.total_value
                );
                entry.total_value = Decimal::ZERO;
                out.clamped += 1;
            }
        }
        out.entries = entries;

        log::debug!(
            "week={} platform={} rows={} entries={} skipped={}",
            self.window.week_id,
            batch.platform,
            out.rows_read,
            out.entries.len(),
            out.skipped_rows()
        );
        Ok(out)
    }

    /// Normalize every batch independently, in parallel.
    /// Output order follows input order.
    pub fn normalize_all(
        &self,
        batches: &[PlatformBatch],
    ) -> Vec<(Platform, PayrollResult<NormalizedBatch>)> {
        batches
            .par_iter()
            .map(|b| (b.platform, self.normalize(b)))
            .collect()
    }
}
