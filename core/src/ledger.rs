//! Payment ledger and freeze manager.
//!
//! Lifecycle of a weekly record:
//!   pending → paid → cancelled
//!   pending → cancelled
//!   paid    → pending          (explicit reissue only)
//!
//! A ledger entry is the canonical truth for a paid week. Once one exists the
//! record is served as: ledger amounts ▷ payment snapshot ▷ live recomputation,
//! field by field. The calculator never rewrites a frozen record.

use crate::{
    calculator::{DriverWeeklyRecord, PartialAmounts, WaterfallAmounts},
    error::{PayrollError, PayrollResult},
    types::{record_id, DriverId, PaymentStatus, RecordId, WeekId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time copy kept on the record when it is paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub ledger_id: String,
    pub paid_at: DateTime<Utc>,
    pub proof_ref: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub snapshot: PartialAmounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Active,
    Voided,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Active => "active",
            LedgerStatus::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LedgerStatus::Active),
            "voided" => Some(LedgerStatus::Voided),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLedgerEntry {
    pub ledger_id: String,
    pub record_id: RecordId,
    pub driver_id: DriverId,
    pub week_id: WeekId,
    /// What was actually disbursed.
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub proof_ref: Option<String>,
    /// Fee breakdown at time of payment. Fields may be absent.
    pub breakdown: PartialAmounts,
    pub status: LedgerStatus,
    pub void_reason: Option<String>,
    /// Whether financing agreements were advanced by this payment.
    pub financing_advanced: bool,
}

impl PaymentLedgerEntry {
    /// Breakdown with the disbursed amount standing in for a missing payout.
    pub fn amounts(&self) -> PartialAmounts {
        PartialAmounts {
            net_payout: self.breakdown.net_payout.or(Some(self.amount)),
            ..self.breakdown
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub paid_at: DateTime<Utc>,
    pub proof_ref: Option<String>,
    /// Defaults to the record's net payout.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMismatch {
    pub ledger_id: String,
    pub record_id: RecordId,
    pub detail: String,
}

/// Findings of an integrity pass. Nothing here is repaired automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Paid records without a resolvable active ledger entry.
    pub orphans: Vec<RecordId>,
    pub mismatched: Vec<IdentifierMismatch>,
    /// Active ledger entries whose record does not exist.
    pub dangling: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.mismatched.is_empty() && self.dangling.is_empty()
    }
}

/// Storage the ledger needs. Every transition is a single write transaction.
pub trait LedgerRepository {
    fn get_record(&self, record_id: &str) -> PayrollResult<Option<DriverWeeklyRecord>>;

    /// Inside one write transaction: read the record, require `pending`, let
    /// `build` produce the ledger entry and snapshot, then persist both and
    /// flip the status to `paid`.
    fn freeze_record<F>(&self, record_id: &str, build: F) -> PayrollResult<PaymentLedgerEntry>
    where
        F: FnOnce(&DriverWeeklyRecord) -> (PaymentLedgerEntry, PaymentInfo);

    /// Move a pending or paid record to `cancelled`, voiding any active
    /// ledger entry with `reason`. Returns the previous status.
    fn cancel_record(&self, record_id: &str, reason: &str) -> PayrollResult<PaymentStatus>;

    /// Void the active ledger entry of a paid record and return it to
    /// `pending`. Returns the voided ledger id.
    fn reopen_record(&self, record_id: &str, reason: &str) -> PayrollResult<String>;

    fn active_ledger_entry(&self, record_id: &str) -> PayrollResult<Option<PaymentLedgerEntry>>;

    /// Active ledger entries, optionally limited to one week.
    fn active_ledger_entries(&self, week_id: Option<&str>) -> PayrollResult<Vec<PaymentLedgerEntry>>;

    /// Non-superseded records, optionally limited to one week.
    fn stored_records(&self, week_id: Option<&str>) -> PayrollResult<Vec<DriverWeeklyRecord>>;
}

pub struct PaymentLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerRepository> PaymentLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// pending → paid. Concurrent attempts on one record: exactly one wins,
    /// the others get `InvalidTransition`.
    pub fn record_payment(
        &self,
        record_id: &str,
        request: &PaymentRequest,
    ) -> PayrollResult<PaymentLedgerEntry> {
        let ledger_id = format!("pay-{}", uuid::Uuid::new_v4());
        let entry = self.store.freeze_record(record_id, |record| {
            let amount = request.amount.unwrap_or(record.amounts.net_payout);
            let snapshot = PartialAmounts::from_full(&record.amounts);
            let entry = PaymentLedgerEntry {
                ledger_id: ledger_id.clone(),
                record_id: record.id.clone(),
                driver_id: record.driver_id.clone(),
                week_id: record.week_id.clone(),
                amount,
                paid_at: request.paid_at,
                proof_ref: request.proof_ref.clone(),
                breakdown: PartialAmounts { net_payout: Some(amount), ..snapshot },
                status: LedgerStatus::Active,
                void_reason: None,
                financing_advanced: !record.amounts.financing_installment.is_zero(),
            };
            let info = PaymentInfo {
                ledger_id: ledger_id.clone(),
                paid_at: request.paid_at,
                proof_ref: request.proof_ref.clone(),
                amount,
                snapshot,
            };
            (entry, info)
        })?;
        log::info!("record {record_id} paid: {} ({})", entry.amount, entry.ledger_id);
        Ok(entry)
    }

    pub fn cancel(&self, record_id: &str, reason: &str) -> PayrollResult<PaymentStatus> {
        let previous = self.store.cancel_record(record_id, reason)?;
        log::info!("record {record_id} cancelled (was {previous}): {reason}");
        Ok(previous)
    }

    /// The explicit reissue procedure: the only way a paid record changes.
    pub fn reissue(&self, record_id: &str, reason: &str) -> PayrollResult<String> {
        let voided = self.store.reopen_record(record_id, reason)?;
        log::info!("record {record_id} reopened for reissue, voided {voided}: {reason}");
        Ok(voided)
    }

    /// Produce the authoritative view of a stored record.
    ///
    /// Pending records pass through. Frozen ones are rebuilt from the ledger
    /// entry, then the payment snapshot, then `recompute` as a last resort.
    pub fn finalize<F>(&self, mut record: DriverWeeklyRecord, recompute: F) -> PayrollResult<DriverWeeklyRecord>
    where
        F: FnOnce(&DriverWeeklyRecord) -> PayrollResult<Option<WaterfallAmounts>>,
    {
        if record.payment_status == PaymentStatus::Pending {
            return Ok(record);
        }

        let ledger = self.store.active_ledger_entry(&record.id)?;
        if ledger.is_none() && record.payment_status == PaymentStatus::Paid {
            log::warn!("record {} is paid but has no active ledger entry", record.id);
        }

        let snapshot = record.payment_info.as_ref().map(|p| p.snapshot).unwrap_or_default();
        let layered = match &ledger {
            Some(entry) => entry.amounts().overlay(&snapshot),
            None => snapshot,
        };
        if layered == PartialAmounts::default() {
            return Ok(record);
        }

        record.amounts = if layered.is_complete() {
            layered.resolve(&record.amounts)
        } else {
            let live = recompute(&record)?.unwrap_or(record.amounts);
            layered.resolve(&live)
        };

        if let (Some(entry), Some(info)) = (&ledger, record.payment_info.as_mut()) {
            info.amount = entry.amount;
            info.paid_at = entry.paid_at;
            info.proof_ref = entry.proof_ref.clone();
        }
        Ok(record)
    }

    /// Orphans, identifier mismatches and dangling ledger entries.
    pub fn validate(&self, week_id: Option<&str>) -> PayrollResult<IntegrityReport> {
        let records = self.store.stored_records(week_id)?;
        let entries = self.store.active_ledger_entries(week_id)?;
        let mut report = IntegrityReport::default();

        for record in &records {
            if record.payment_status != PaymentStatus::Paid {
                continue;
            }
            let Some(entry) = entries.iter().find(|e| e.record_id == record.id) else {
                report.orphans.push(record.id.clone());
                continue;
            };
            if let Some(info) = &record.payment_info {
                if info.ledger_id != entry.ledger_id {
                    report.mismatched.push(IdentifierMismatch {
                        ledger_id: entry.ledger_id.clone(),
                        record_id: record.id.clone(),
                        detail: format!("record snapshot points at {}", info.ledger_id),
                    });
                }
            }
        }

        for entry in &entries {
            let expected = record_id(&entry.driver_id, &entry.week_id);
            if entry.record_id != expected {
                report.mismatched.push(IdentifierMismatch {
                    ledger_id: entry.ledger_id.clone(),
                    record_id: entry.record_id.clone(),
                    detail: format!("driver/week resolve to {expected}"),
                });
            }
            match records.iter().find(|r| r.id == entry.record_id) {
                None => {
                    if self.store.get_record(&entry.record_id)?.is_none() {
                        report.dangling.push(entry.ledger_id.clone());
                    }
                }
                Some(r) if r.payment_status != PaymentStatus::Paid => {
                    report.mismatched.push(IdentifierMismatch {
                        ledger_id: entry.ledger_id.clone(),
                        record_id: r.id.clone(),
                        detail: format!("active ledger entry on a {} record", r.payment_status),
                    });
                }
                Some(_) => {}
            }
        }

        for orphan in &report.orphans {
            log::warn!("integrity: orphan paid record {orphan}");
        }
        for m in &report.mismatched {
            log::warn!("integrity: {} / {}: {}", m.ledger_id, m.record_id, m.detail);
        }
        for d in &report.dangling {
            log::warn!("integrity: ledger entry {d} has no record");
        }
        Ok(report)
    }
}

/// Guard used by stores when a transition is attempted from the wrong state.
pub fn transition_error(record_id: &str, from: PaymentStatus, to: PaymentStatus) -> PayrollError {
    PayrollError::InvalidTransition {
        record_id: record_id.to_string(),
        from,
        to,
    }
}
