//! Weekly record calculator: the financial waterfall.
//!
//!   gross ride earnings
//!     − tax
//!     = earnings net of tax
//!     − admin fee (base rate + active financing interest)
//!     − fuel
//!     − tolls            (renters only)
//!     − rental           (renters only)
//!     − financing installments
//!     = net payout
//!
//! Pure: the same entries, driver and agreements always give the same record.
//! Each field is rounded to cents as it becomes a record field, and every
//! later step works from those rounded fields, so the stored record adds up:
//! gross − tax = net of tax, and net of tax minus the deductions = net payout.

use crate::{
    config::WaterfallConfig,
    ledger::PaymentInfo,
    money::round2,
    normalizer::NormalizedWeeklyEntry,
    roster::{Driver, FinancingAgreement},
    types::{record_id, ContractorType, DriverId, PaymentStatus, Platform, RecordId, WeekId},
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every monetary field of a weekly record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaterfallAmounts {
    pub ride_a_earnings: Decimal,
    pub ride_b_earnings: Decimal,
    pub gross_ride_earnings: Decimal,
    pub tax_amount: Decimal,
    pub earnings_net_of_tax: Decimal,
    pub admin_fee_amount: Decimal,
    pub fuel_expense: Decimal,
    pub toll_expense: Decimal,
    pub rental_expense: Decimal,
    pub financing_installment: Decimal,
    pub net_payout: Decimal,
}

/// Amounts where any field may be missing, as found in ledger entries and
/// payment snapshots written by older versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialAmounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_a_earnings: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_b_earnings: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_ride_earnings: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings_net_of_tax: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_fee_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_expense: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toll_expense: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rental_expense: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financing_installment: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_payout: Option<Decimal>,
}

impl PartialAmounts {
    pub fn from_full(a: &WaterfallAmounts) -> Self {
        Self {
            ride_a_earnings: Some(a.ride_a_earnings),
            ride_b_earnings: Some(a.ride_b_earnings),
            gross_ride_earnings: Some(a.gross_ride_earnings),
            tax_amount: Some(a.tax_amount),
            earnings_net_of_tax: Some(a.earnings_net_of_tax),
            admin_fee_amount: Some(a.admin_fee_amount),
            fuel_expense: Some(a.fuel_expense),
            toll_expense: Some(a.toll_expense),
            rental_expense: Some(a.rental_expense),
            financing_installment: Some(a.financing_installment),
            net_payout: Some(a.net_payout),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.ride_a_earnings.is_some()
            && self.ride_b_earnings.is_some()
            && self.gross_ride_earnings.is_some()
            && self.tax_amount.is_some()
            && self.earnings_net_of_tax.is_some()
            && self.admin_fee_amount.is_some()
            && self.fuel_expense.is_some()
            && self.toll_expense.is_some()
            && self.rental_expense.is_some()
            && self.financing_installment.is_some()
            && self.net_payout.is_some()
    }

    /// Fields present here win; gaps are filled from `fallback`.
    pub fn overlay(&self, fallback: &PartialAmounts) -> Self {
        Self {
            ride_a_earnings: self.ride_a_earnings.or(fallback.ride_a_earnings),
            ride_b_earnings: self.ride_b_earnings.or(fallback.ride_b_earnings),
            gross_ride_earnings: self.gross_ride_earnings.or(fallback.gross_ride_earnings),
            tax_amount: self.tax_amount.or(fallback.tax_amount),
            earnings_net_of_tax: self.earnings_net_of_tax.or(fallback.earnings_net_of_tax),
            admin_fee_amount: self.admin_fee_amount.or(fallback.admin_fee_amount),
            fuel_expense: self.fuel_expense.or(fallback.fuel_expense),
            toll_expense: self.toll_expense.or(fallback.toll_expense),
            rental_expense: self.rental_expense.or(fallback.rental_expense),
            financing_installment: self.financing_installment.or(fallback.financing_installment),
            net_payout: self.net_payout.or(fallback.net_payout),
        }
    }

    /// Last resort: anything still missing comes from `live`.
    pub fn resolve(&self, live: &WaterfallAmounts) -> WaterfallAmounts {
        WaterfallAmounts {
            ride_a_earnings: self.ride_a_earnings.unwrap_or(live.ride_a_earnings),
            ride_b_earnings: self.ride_b_earnings.unwrap_or(live.ride_b_earnings),
            gross_ride_earnings: self.gross_ride_earnings.unwrap_or(live.gross_ride_earnings),
            tax_amount: self.tax_amount.unwrap_or(live.tax_amount),
            earnings_net_of_tax: self.earnings_net_of_tax.unwrap_or(live.earnings_net_of_tax),
            admin_fee_amount: self.admin_fee_amount.unwrap_or(live.admin_fee_amount),
            fuel_expense: self.fuel_expense.unwrap_or(live.fuel_expense),
            toll_expense: self.toll_expense.unwrap_or(live.toll_expense),
            rental_expense: self.rental_expense.unwrap_or(live.rental_expense),
            financing_installment: self.financing_installment.unwrap_or(live.financing_installment),
            net_payout: self.net_payout.unwrap_or(live.net_payout),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverWeeklyRecord {
    pub id: RecordId,
    pub driver_id: DriverId,
    pub week_id: WeekId,
    pub contractor_type: ContractorType,
    pub total_trips: u64,
    #[serde(flatten)]
    pub amounts: WaterfallAmounts,
    /// True when `toll_expense` was subtracted from the payout.
    pub toll_deducted: bool,
    pub payment_status: PaymentStatus,
    pub payment_info: Option<PaymentInfo>,
}

/// Everything the waterfall needs for one driver and one week.
#[derive(Debug, Clone, Copy)]
pub struct DriverWeekInput<'a> {
    pub driver: &'a Driver,
    pub entries: &'a [NormalizedWeeklyEntry],
    pub financing: &'a [FinancingAgreement],
}

pub struct WeeklyRecordCalculator {
    config: WaterfallConfig,
}

impl WeeklyRecordCalculator {
    pub fn new(config: WaterfallConfig) -> Self {
        Self { config }
    }

    /// Run the waterfall. Returns None when no platform contributed anything.
    pub fn compute(&self, week_id: &str, input: DriverWeekInput<'_>) -> Option<DriverWeeklyRecord> {
        let sum = |platform: Platform| -> Decimal {
            input
                .entries
                .iter()
                .filter(|e| e.platform == platform)
                .map(|e| e.total_value)
                .sum()
        };

        let ride_a = sum(Platform::RideA);
        let ride_b = sum(Platform::RideB);
        let fuel = sum(Platform::FuelCard);
        let toll = sum(Platform::TollTag);
        let trips: u64 = input
            .entries
            .iter()
            .filter(|e| e.platform.is_ride())
            .map(|e| e.total_trips)
            .sum();

        if ride_a.is_zero() && ride_b.is_zero() && fuel.is_zero() && toll.is_zero() && trips == 0 {
            return None;
        }

        let driver = input.driver;
        let renter = driver.contractor_type == ContractorType::Renter;
        let active_financing: Vec<&FinancingAgreement> = input
            .financing
            .iter()
            .filter(|f| f.driver_id == driver.id && f.is_active())
            .collect();

        let ride_a = round2(ride_a);
        let ride_b = round2(ride_b);
        let gross = ride_a + ride_b;
        let tax = round2(gross * self.config.tax_rate);
        let net_of_tax = gross - tax;

        let interest_percent: Decimal = active_financing
            .iter()
            .map(|f| f.weekly_interest_percent)
            .sum();
        let admin_fee = round2(
            net_of_tax * self.config.admin_fee_rate
                + net_of_tax * (interest_percent / Decimal::ONE_HUNDRED),
        );

        let fuel = round2(fuel);
        let toll = round2(toll);
        let rental = if renter { round2(driver.rental_fee_per_week) } else { Decimal::ZERO };
        let toll_deduction = if renter { toll } else { Decimal::ZERO };
        let financing = round2(active_financing.iter().map(|f| f.weekly_installment).sum());

        let net_payout = net_of_tax - admin_fee - fuel - toll_deduction - rental - financing;

        let amounts = WaterfallAmounts {
            ride_a_earnings: ride_a,
            ride_b_earnings: ride_b,
            gross_ride_earnings: gross,
            tax_amount: tax,
            earnings_net_of_tax: net_of_tax,
            admin_fee_amount: admin_fee,
            fuel_expense: fuel,
            toll_expense: toll,
            rental_expense: rental,
            financing_installment: financing,
            net_payout,
        };

        Some(DriverWeeklyRecord {
            id: record_id(&driver.id, week_id),
            driver_id: driver.id.clone(),
            week_id: week_id.to_string(),
            contractor_type: driver.contractor_type,
            total_trips: trips,
            amounts,
            toll_deducted: renter,
            payment_status: PaymentStatus::Pending,
            payment_info: None,
        })
    }

    /// Compute every driver in parallel. Output is sorted by driver id.
    pub fn compute_all(&self, week_id: &str, inputs: &[DriverWeekInput<'_>]) -> Vec<DriverWeeklyRecord> {
        let mut records: Vec<DriverWeeklyRecord> = inputs
            .par_iter()
            .filter_map(|input| self.compute(week_id, *input))
            .collect();
        records.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        records
    }
}
