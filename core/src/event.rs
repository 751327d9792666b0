//! The audit log: every state change the engine makes.
//!
//! RULE: Components never write audit rows directly.
//! They return or emit PayrollEvent values and the store appends them.

use crate::types::{DriverId, Platform, RecordId, WeekId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Variants are appended over time; never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayrollEvent {
    // ── Import ─────────────────────────────────────
    PlatformImported {
        week_id: WeekId,
        platform: Platform,
        source_ref: String,
        entries: usize,
        skipped_rows: usize,
    },
    PlatformFailed {
        week_id: WeekId,
        platform: Platform,
        message: String,
    },

    // ── Weekly records ─────────────────────────────
    RecordComputed {
        record_id: RecordId,
        net_payout: Decimal,
    },
    RecordSuperseded {
        record_id: RecordId,
    },

    // ── Ledger ─────────────────────────────────────
    PaymentRecorded {
        record_id: RecordId,
        ledger_id: String,
        amount: Decimal,
    },
    PaymentCancelled {
        record_id: RecordId,
        reason: String,
    },
    PaymentReissued {
        record_id: RecordId,
        voided_ledger_id: String,
        reason: String,
    },

    // ── Referral ───────────────────────────────────
    InviteIssued {
        code: String,
        referrer_id: DriverId,
    },
    InviteAccepted {
        code: String,
        referrer_id: DriverId,
        driver_id: DriverId,
    },

    // ── Goals ──────────────────────────────────────
    GoalsEvaluated {
        driver_id: DriverId,
        week_id: WeekId,
        achieved: usize,
    },
}

impl PayrollEvent {
    /// Stable name for the event_type column in audit_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            PayrollEvent::PlatformImported { .. } => "platform_imported",
            PayrollEvent::PlatformFailed { .. }   => "platform_failed",
            PayrollEvent::RecordComputed { .. }   => "record_computed",
            PayrollEvent::RecordSuperseded { .. } => "record_superseded",
            PayrollEvent::PaymentRecorded { .. }  => "payment_recorded",
            PayrollEvent::PaymentCancelled { .. } => "payment_cancelled",
            PayrollEvent::PaymentReissued { .. }  => "payment_reissued",
            PayrollEvent::InviteIssued { .. }     => "invite_issued",
            PayrollEvent::InviteAccepted { .. }   => "invite_accepted",
            PayrollEvent::GoalsEvaluated { .. }   => "goals_evaluated",
        }
    }
}

/// A persisted audit log row.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub week_id: Option<WeekId>,
    pub component: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: String,
}
