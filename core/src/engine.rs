//! The payroll engine: processes one week end to end.
//!
//! STAGES (fixed order, every run):
//!   1. Normalize every platform batch     (parallel)
//!   2. Replace each good platform's partition of normalized entries
//!   3. Resolve all entries of the week to drivers
//!   4. Compute pending weekly records      (parallel)
//!   5. Supersede pending records nothing contributes to any more
//!
//! RULES:
//!   - A failing platform never blocks the others; the week goes `partial`.
//!   - Paid and cancelled records are never recomputed.
//!   - Downstream consumers only ever see finalized records.
//!   - All state changes are recorded in the audit log.

use crate::{
    calculator::{DriverWeekInput, DriverWeeklyRecord, WaterfallAmounts, WeeklyRecordCalculator},
    config::PayrollConfig,
    error::{PayrollError, PayrollResult},
    event::{AuditLogEntry, PayrollEvent},
    goals::{GoalAchievement, GoalEvaluator, GoalRepository},
    kpi::{KpiInputs, KpiScorer, PerformanceKpi, PerformanceRepository, PerformanceSample},
    ledger::{IntegrityReport, PaymentLedger, PaymentLedgerEntry, PaymentRequest},
    normalizer::{Normalizer, PlatformBatch},
    referral::{AffiliateNetwork, CommissionReport, ReferralEngine, ReferralInvite, ReferralRepository},
    resolver::{DriverResolver, Resolution},
    store::{PayrollStore, PayrollWeek, WeekStatus},
    types::{record_id, week_of_record, PaymentStatus, Platform, RecordId, WeekId},
    week::WeekWindow,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;

/// What happened to one submitted platform batch.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub source_ref: String,
    pub imported: bool,
    pub entries: usize,
    pub rows_read: usize,
    pub skipped_rows: usize,
    pub clamped: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecomputeSummary {
    pub computed: usize,
    /// Paid or cancelled rows left as they were.
    pub frozen: usize,
    pub superseded: Vec<RecordId>,
    pub unresolved: BTreeMap<Platform, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekProcessingSummary {
    pub week_id: WeekId,
    pub status: WeekStatus,
    pub platforms: Vec<PlatformOutcome>,
    pub unresolved: BTreeMap<Platform, usize>,
    pub records_computed: usize,
    pub records_frozen: usize,
    pub records_superseded: usize,
}

impl WeekProcessingSummary {
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.platforms.iter().filter(|p| !p.imported).map(|p| p.platform).collect()
    }
}

pub struct PayrollEngine {
    config: PayrollConfig,
    calculator: WeeklyRecordCalculator,
    store: PayrollStore,
}

impl PayrollEngine {
    pub fn new(config: PayrollConfig, store: PayrollStore) -> Self {
        Self {
            calculator: WeeklyRecordCalculator::new(config.waterfall.clone()),
            config,
            store,
        }
    }

    /// In-memory store, migrated, with `PayrollConfig::default_test()`.
    pub fn build_test() -> PayrollResult<Self> {
        let store = PayrollStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(PayrollConfig::default_test(), store))
    }

    pub fn store(&self) -> &PayrollStore {
        &self.store
    }

    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    // ── Weekly processing ──────────────────────────────────────

    /// Import the given platform batches for `window` and recompute the week.
    ///
    /// Batches for the same platform are imported together as one partition.
    /// Platforms that fail keep whatever entries they had before. Only
    /// storage errors outside a platform's own partition are returned.
    pub fn process_week(
        &self,
        window: &WeekWindow,
        batches: &[PlatformBatch],
    ) -> PayrollResult<WeekProcessingSummary> {
        let week_id = window.week_id.as_str();
        let batches = PlatformBatch::merge_by_platform(batches);
        let normalizer = Normalizer::new(window.clone());
        let results = normalizer.normalize_all(&batches);

        let mut platforms = Vec::with_capacity(batches.len());
        for (batch, (platform, result)) in batches.iter().zip(results) {
            let stored = result.and_then(|normalized| {
                self.store.replace_partition(week_id, platform, &normalized.entries)?;
                Ok(normalized)
            });
            let outcome = match stored {
                Ok(n) => {
                    self.emit(
                        "normalizer",
                        Some(week_id),
                        &PayrollEvent::PlatformImported {
                            week_id: week_id.to_string(),
                            platform,
                            source_ref: batch.source_ref.clone(),
                            entries: n.entries.len(),
                            skipped_rows: n.skipped_rows(),
                        },
                    )?;
                    PlatformOutcome {
                        platform,
                        source_ref: batch.source_ref.clone(),
                        imported: true,
                        entries: n.entries.len(),
                        rows_read: n.rows_read,
                        skipped_rows: n.skipped_rows(),
                        clamped: n.clamped,
                        error: None,
                    }
                }
                Err(e) => {
                    log::warn!("week={week_id} platform={platform} skipped: {e}");
                    self.emit(
                        "normalizer",
                        Some(week_id),
                        &PayrollEvent::PlatformFailed {
                            week_id: week_id.to_string(),
                            platform,
                            message: e.to_string(),
                        },
                    )?;
                    PlatformOutcome {
                        platform,
                        source_ref: batch.source_ref.clone(),
                        imported: false,
                        entries: 0,
                        rows_read: batch.rows.len(),
                        skipped_rows: 0,
                        clamped: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            platforms.push(outcome);
        }

        let failed: Vec<Platform> =
            platforms.iter().filter(|p| !p.imported).map(|p| p.platform).collect();
        let status = if failed.is_empty() {
            WeekStatus::Complete
        } else if failed.len() == platforms.len() {
            WeekStatus::Failed
        } else {
            WeekStatus::Partial
        };

        let recompute = self.recompute_week(window)?;

        self.store.upsert_week(&PayrollWeek {
            week_id: week_id.to_string(),
            start: window.start,
            end: window.end,
            status,
            failed_platforms: failed,
            processed_at: Utc::now(),
        })?;

        let summary = WeekProcessingSummary {
            week_id: week_id.to_string(),
            status,
            platforms,
            records_computed: recompute.computed,
            records_frozen: recompute.frozen,
            records_superseded: recompute.superseded.len(),
            unresolved: recompute.unresolved,
        };
        log::info!(
            "week={} status={} computed={} frozen={} superseded={} unresolved={}",
            summary.week_id,
            summary.status.as_str(),
            summary.records_computed,
            summary.records_frozen,
            summary.records_superseded,
            summary.unresolved.values().sum::<usize>()
        );
        Ok(summary)
    }

    /// Rebuild every pending record of the week from stored entries.
    pub fn recompute_week(&self, window: &WeekWindow) -> PayrollResult<RecomputeSummary> {
        let week_id = window.week_id.as_str();
        let entries = self.store.week_entries(week_id)?;
        let roster = self.store.drivers()?;
        let resolver = DriverResolver::build(&roster);
        let resolved = resolver.resolve_all(entries);
        let financing = self.store.active_financing()?;

        let inputs: Vec<DriverWeekInput<'_>> = resolved
            .by_driver
            .iter()
            .filter_map(|(driver_id, entries)| {
                resolver.driver(driver_id).map(|driver| DriverWeekInput {
                    driver,
                    entries,
                    financing: &financing,
                })
            })
            .collect();
        let records = self.calculator.compute_all(week_id, &inputs);

        let mut summary = RecomputeSummary {
            unresolved: resolved.unresolved.clone(),
            ..Default::default()
        };
        for record in &records {
            if self.store.upsert_pending_record(record)? {
                summary.computed += 1;
                self.emit(
                    "calculator",
                    Some(week_id),
                    &PayrollEvent::RecordComputed {
                        record_id: record.id.clone(),
                        net_payout: record.amounts.net_payout,
                    },
                )?;
            } else {
                log::debug!("record {} is frozen, not recomputed", record.id);
                summary.frozen += 1;
            }
        }

        let current: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        summary.superseded = self.store.supersede_stale_records(week_id, &current)?;
        for record_id in &summary.superseded {
            self.emit(
                "calculator",
                Some(week_id),
                &PayrollEvent::RecordSuperseded { record_id: record_id.clone() },
            )?;
        }

        log::debug!(
            "week={week_id} drivers={} records={} superseded={}",
            inputs.len(),
            records.len(),
            summary.superseded.len()
        );
        Ok(summary)
    }

    // ── Finalized reads ────────────────────────────────────────

    /// Records of the week as consumers should see them: pending rows live,
    /// frozen rows merged with their ledger entry. Superseded rows excluded.
    pub fn weekly_records(
        &self,
        week_id: &str,
        driver_id: Option<&str>,
    ) -> PayrollResult<Vec<DriverWeeklyRecord>> {
        let ledger = PaymentLedger::new(&self.store);
        let mut out = Vec::new();
        for record in self.store.stored_week_records(Some(week_id))? {
            if driver_id.is_some_and(|d| d != record.driver_id) {
                continue;
            }
            out.push(ledger.finalize(record, |r| self.live_amounts(r))?);
        }
        Ok(out)
    }

    pub fn finalized_record(
        &self,
        driver_id: &str,
        week_id: &str,
    ) -> PayrollResult<Option<DriverWeeklyRecord>> {
        Ok(self.weekly_records(week_id, Some(driver_id))?.into_iter().next())
    }

    /// Processed weeks, most recent first.
    pub fn available_weeks(&self) -> PayrollResult<Vec<WeekId>> {
        self.store.available_weeks()
    }

    /// Waterfall for one record from the entries stored right now.
    fn live_amounts(&self, record: &DriverWeeklyRecord) -> PayrollResult<Option<WaterfallAmounts>> {
        let roster = self.store.drivers()?;
        let resolver = DriverResolver::build(&roster);
        let Some(driver) = resolver.driver(&record.driver_id) else {
            return Ok(None);
        };
        let mut resolved = resolver.resolve_all(self.store.week_entries(&record.week_id)?);
        let entries = resolved.by_driver.remove(&driver.id).unwrap_or_default();
        let financing = self.store.financing_for_driver(&driver.id)?;
        let input = DriverWeekInput { driver, entries: &entries, financing: &financing };
        Ok(self.calculator.compute(&record.week_id, input).map(|r| r.amounts))
    }

    // ── Payments ───────────────────────────────────────────────

    pub fn record_payment(
        &self,
        record_id: &str,
        request: &PaymentRequest,
    ) -> PayrollResult<PaymentLedgerEntry> {
        let entry = PaymentLedger::new(&self.store).record_payment(record_id, request)?;
        self.emit(
            "ledger",
            Some(&entry.week_id),
            &PayrollEvent::PaymentRecorded {
                record_id: entry.record_id.clone(),
                ledger_id: entry.ledger_id.clone(),
                amount: entry.amount,
            },
        )?;
        Ok(entry)
    }

    pub fn cancel_payment(&self, record_id: &str, reason: &str) -> PayrollResult<PaymentStatus> {
        let previous = PaymentLedger::new(&self.store).cancel(record_id, reason)?;
        self.emit(
            "ledger",
            week_of_record(record_id),
            &PayrollEvent::PaymentCancelled {
                record_id: record_id.to_string(),
                reason: reason.to_string(),
            },
        )?;
        Ok(previous)
    }

    /// Void the payment of a paid record and recompute its week.
    /// Returns the voided ledger id.
    pub fn reissue_payment(&self, record_id: &str, reason: &str) -> PayrollResult<String> {
        let week_id = week_of_record(record_id)
            .ok_or_else(|| PayrollError::RecordNotFound { record_id: record_id.to_string() })?;
        let window = WeekWindow::parse(week_id)?;

        let voided = PaymentLedger::new(&self.store).reissue(record_id, reason)?;
        self.emit(
            "ledger",
            Some(week_id),
            &PayrollEvent::PaymentReissued {
                record_id: record_id.to_string(),
                voided_ledger_id: voided.clone(),
                reason: reason.to_string(),
            },
        )?;
        self.recompute_week(&window)?;
        Ok(voided)
    }

    pub fn validate_integrity(&self, week_id: Option<&str>) -> PayrollResult<IntegrityReport> {
        PaymentLedger::new(&self.store).validate(week_id)
    }

    // ── Referrals ──────────────────────────────────────────────

    fn referrals(&self) -> ReferralEngine<'_, PayrollStore> {
        ReferralEngine::new(&self.store, self.config.referral.clone())
    }

    pub fn issue_invite(&self, referrer_id: &str, now: DateTime<Utc>) -> PayrollResult<ReferralInvite> {
        let invite = self.referrals().issue_invite(referrer_id, now)?;
        self.emit(
            "referral",
            None,
            &PayrollEvent::InviteIssued {
                code: invite.code.clone(),
                referrer_id: invite.referrer_id.clone(),
            },
        )?;
        Ok(invite)
    }

    pub fn accept_invite(
        &self,
        code: &str,
        driver_id: &str,
        now: DateTime<Utc>,
    ) -> PayrollResult<ReferralInvite> {
        let invite = self.referrals().accept_invite(code, driver_id, now)?;
        self.emit(
            "referral",
            None,
            &PayrollEvent::InviteAccepted {
                code: invite.code.clone(),
                referrer_id: invite.referrer_id.clone(),
                driver_id: driver_id.to_string(),
            },
        )?;
        Ok(invite)
    }

    pub fn network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        self.referrals().network(referrer_id)
    }

    pub fn sync_network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        self.referrals().sync_network(referrer_id)
    }

    pub fn commissions(&self, referrer_id: &str, week_id: &str) -> PayrollResult<CommissionReport> {
        self.referrals()
            .commissions(referrer_id, week_id, |driver_id| self.finalized_record(driver_id, week_id))
    }

    // ── Goals & KPI ────────────────────────────────────────────

    pub fn evaluate_goals(&self, driver_id: &str, week_id: &str) -> PayrollResult<Vec<GoalAchievement>> {
        let window = WeekWindow::parse(week_id)?;
        let record = self.finalized_record(driver_id, week_id)?.ok_or_else(|| {
            PayrollError::RecordNotFound { record_id: record_id(driver_id, week_id) }
        })?;
        let results = GoalEvaluator::new(&self.store).evaluate_and_store(&record, &window)?;
        self.emit(
            "goals",
            Some(week_id),
            &PayrollEvent::GoalsEvaluated {
                driver_id: driver_id.to_string(),
                week_id: week_id.to_string(),
                achieved: results.iter().filter(|a| a.achieved).count(),
            },
        )?;
        Ok(results)
    }

    pub fn goal_achievements(&self, driver_id: &str, week_id: &str) -> PayrollResult<Vec<GoalAchievement>> {
        self.store.achievements(driver_id, week_id)
    }

    pub fn record_performance(&self, sample: &PerformanceSample) -> PayrollResult<()> {
        self.store.upsert_performance_sample(sample)
    }

    pub fn driver_kpi(&self, driver_id: &str, week_id: &str) -> PayrollResult<PerformanceKpi> {
        if self.store.get_driver(driver_id)?.is_none() {
            return Err(PayrollError::DriverNotFound { driver_id: driver_id.to_string() });
        }

        let revenue = self
            .finalized_record(driver_id, week_id)?
            .and_then(|r| r.amounts.gross_ride_earnings.to_f64())
            .unwrap_or(0.0);
        let sample = self.store.performance_sample(driver_id, week_id)?;
        let hours = match sample.as_ref().and_then(|s| s.active_hours) {
            Some(h) => h,
            None => self.telemetry_hours(driver_id, week_id)?,
        };
        let recruits = self.store.network(driver_id)?.active_recruited;

        let inputs = KpiInputs {
            weekly_revenue: revenue,
            acceptance_rate: sample.as_ref().map(|s| s.acceptance_rate).unwrap_or(0.0),
            passenger_rating: sample.as_ref().map(|s| s.passenger_rating).unwrap_or(0.0),
            active_recruits: f64::from(recruits),
            active_hours: hours,
        };
        Ok(KpiScorer::new(self.config.kpi.clone()).score(driver_id, week_id, inputs))
    }

    /// Active hours reported by telemetry for the driver's vehicle.
    fn telemetry_hours(&self, driver_id: &str, week_id: &str) -> PayrollResult<f64> {
        let roster = self.store.drivers()?;
        let resolver = DriverResolver::build(&roster);
        let hours = self
            .store
            .week_entries(week_id)?
            .iter()
            .filter(|e| e.platform == Platform::Telemetry)
            .filter(|e| {
                matches!(
                    resolver.resolve(e),
                    Resolution::Matched { driver_id: ref d, .. } if d == driver_id
                )
            })
            .filter_map(|e| e.total_value.to_f64())
            .sum();
        Ok(hours)
    }

    // ── Audit ──────────────────────────────────────────────────

    fn emit(&self, component: &str, week_id: Option<&str>, event: &PayrollEvent) -> PayrollResult<()> {
        let entry = AuditLogEntry {
            id: None,
            week_id: week_id.map(str::to_string),
            component: component.to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            created_at: Utc::now().to_rfc3339(),
        };
        self.store.append_audit(&entry)
    }
}
