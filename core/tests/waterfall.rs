//! Integration tests for the weekly waterfall.
//!
//! 1. Renters pay rental and tolls, affiliates do not
//! 2. Active financing adds interest to the admin fee and an installment
//! 3. Gross is always the sum of both ride platforms
//! 4. Stored fields add up to the stored payout
//! 5. No contribution means no record

use fleetpay_core::{
    calculator::{DriverWeekInput, WeeklyRecordCalculator},
    config::PayrollConfig,
    normalizer::NormalizedWeeklyEntry,
    roster::{Driver, FinancingAgreement, FinancingStatus},
    types::{ContractorType, DriverStatus, PaymentStatus, Platform},
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

const WEEK: &str = "2025-W03";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn calculator() -> WeeklyRecordCalculator {
    WeeklyRecordCalculator::new(PayrollConfig::default_test().waterfall)
}

fn driver(id: &str, contractor_type: ContractorType, rent: &str) -> Driver {
    Driver {
        id: id.to_string(),
        name: id.to_string(),
        contractor_type,
        rental_fee_per_week: dec(rent),
        integrations: BTreeMap::new(),
        vehicle_plate: None,
        referred_by: None,
        status: DriverStatus::Active,
    }
}

fn entry(platform: Platform, value: &str, trips: u64) -> NormalizedWeeklyEntry {
    NormalizedWeeklyEntry {
        week_id: WEEK.into(),
        platform,
        reference_id: format!("{platform}-ref"),
        reference_label: None,
        driver_id: None,
        total_value: dec(value),
        total_trips: trips,
        source_ref: "test".into(),
        row_count: 1,
    }
}

/// ride_a 300, ride_b 200, fuel 40, tolls 15.
fn standard_week() -> Vec<NormalizedWeeklyEntry> {
    vec![
        entry(Platform::RideA, "300", 20),
        entry(Platform::RideB, "200", 12),
        entry(Platform::FuelCard, "40", 0),
        entry(Platform::TollTag, "15", 0),
    ]
}

fn financing(driver_id: &str, installment: &str, interest: &str) -> FinancingAgreement {
    FinancingAgreement {
        id: format!("fin-{driver_id}"),
        driver_id: driver_id.to_string(),
        principal: dec("1000"),
        weekly_installment: dec(installment),
        weekly_interest_percent: dec(interest),
        remaining_weeks: 20,
        status: FinancingStatus::Active,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Contractor types
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn renter_waterfall() {
    let d = driver("d-renter", ContractorType::Renter, "290");
    let entries = standard_week();
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .expect("record");

    let a = r.amounts;
    assert_eq!(a.gross_ride_earnings, dec("500.00"));
    assert_eq!(a.tax_amount, dec("30.00"));
    assert_eq!(a.earnings_net_of_tax, dec("470.00"));
    assert_eq!(a.admin_fee_amount, dec("32.90"));
    assert_eq!(a.rental_expense, dec("290"));
    assert_eq!(a.net_payout, dec("92.10"));
    assert!(r.toll_deducted);
    assert_eq!(r.total_trips, 32);
    assert_eq!(r.id, "d-renter:2025-W03");
    assert_eq!(r.payment_status, PaymentStatus::Pending);
}

#[test]
fn affiliate_keeps_tolls_and_pays_no_rent() {
    // A rental fee on an affiliate's profile is ignored.
    let d = driver("d-affil", ContractorType::Affiliate, "290");
    let entries = standard_week();
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap();

    assert_eq!(r.amounts.toll_expense, dec("15"), "tolls are reported");
    assert!(!r.toll_deducted, "but not deducted");
    assert_eq!(r.amounts.rental_expense, Decimal::ZERO);
    assert_eq!(r.amounts.net_payout, dec("397.10"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Financing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn financing_adds_interest_and_installment() {
    let d = driver("d-affil", ContractorType::Affiliate, "0");
    let entries = standard_week();
    let agreements = vec![financing("d-affil", "50", "2")];
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &agreements })
        .unwrap();

    // 7% of 470 plus 2% of 470.
    assert_eq!(r.amounts.admin_fee_amount, dec("42.30"));
    assert_eq!(r.amounts.financing_installment, dec("50"));
    assert_eq!(r.amounts.net_payout, dec("337.70"));
}

#[test]
fn completed_and_foreign_financing_are_ignored() {
    let d = driver("d-affil", ContractorType::Affiliate, "0");
    let entries = standard_week();
    let mut done = financing("d-affil", "50", "2");
    done.status = FinancingStatus::Completed;
    let mut exhausted = financing("d-affil", "50", "2");
    exhausted.remaining_weeks = 0;
    let someone_else = financing("d-other", "80", "5");

    let agreements = vec![done, exhausted, someone_else];
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &agreements })
        .unwrap();

    assert_eq!(r.amounts.financing_installment, Decimal::ZERO);
    assert_eq!(r.amounts.net_payout, dec("397.10"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Invariants
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn gross_is_sum_of_ride_platforms() {
    let d = driver("d1", ContractorType::Affiliate, "0");
    let entries = vec![
        entry(Platform::RideA, "123.455", 3),
        entry(Platform::RideA, "10.01", 1),
        entry(Platform::RideB, "0.333", 1),
    ];
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap();

    let a = r.amounts;
    assert_eq!(a.ride_a_earnings, dec("133.47"));
    assert_eq!(a.ride_b_earnings, dec("0.33"));
    assert_eq!(a.gross_ride_earnings, dec("133.80"));
    assert_eq!(a.tax_amount + a.earnings_net_of_tax, a.gross_ride_earnings);
}

#[test]
fn sub_cent_payout_matches_its_own_fields() {
    let d = driver("d1", ContractorType::Affiliate, "0");
    let entries = vec![entry(Platform::RideA, "100.05", 4)];
    let a = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap()
        .amounts;

    // 6% of 100.05 is 6.003, 7% of 94.05 is 6.5835.
    assert_eq!(a.tax_amount, dec("6.00"));
    assert_eq!(a.earnings_net_of_tax, dec("94.05"));
    assert_eq!(a.admin_fee_amount, dec("6.58"));
    assert_eq!(a.net_payout, dec("87.47"));

    let entries = vec![entry(Platform::RideA, "100.25", 4)];
    let a = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap()
        .amounts;
    assert_eq!(a.tax_amount, dec("6.02"));
    assert_eq!(a.earnings_net_of_tax, dec("94.23"));
}

#[test]
fn renter_fields_reconcile_with_payout() {
    let d = driver("d-renter", ContractorType::Renter, "100.005");
    let entries = vec![
        entry(Platform::RideA, "100.255", 7),
        entry(Platform::RideB, "50.125", 3),
        entry(Platform::FuelCard, "12.345", 0),
        entry(Platform::TollTag, "3.335", 0),
    ];
    let agreements = vec![financing("d-renter", "10.555", "1.5")];
    let a = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &agreements })
        .unwrap()
        .amounts;

    assert_eq!(a.ride_a_earnings + a.ride_b_earnings, a.gross_ride_earnings);
    assert_eq!(a.gross_ride_earnings - a.tax_amount, a.earnings_net_of_tax);
    assert_eq!(
        a.earnings_net_of_tax
            - a.admin_fee_amount
            - a.fuel_expense
            - a.toll_expense
            - a.rental_expense
            - a.financing_installment,
        a.net_payout
    );
    assert_eq!(a.rental_expense, dec("100.01"));
    assert_eq!(a.financing_installment, dec("10.56"));
}

#[test]
fn negative_payout_is_reported_not_clamped() {
    let d = driver("d-renter", ContractorType::Renter, "290");
    let entries = vec![entry(Platform::RideA, "100", 5)];
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap();

    // 94 - 6.58 - 290
    assert_eq!(r.amounts.net_payout, dec("-202.58"));
}

#[test]
fn no_contribution_no_record() {
    let d = driver("d1", ContractorType::Renter, "290");
    let none = calculator().compute(WEEK, DriverWeekInput { driver: &d, entries: &[], financing: &[] });
    assert!(none.is_none());

    let zeros = vec![entry(Platform::RideA, "0", 0), entry(Platform::FuelCard, "0", 0)];
    let none = calculator().compute(WEEK, DriverWeekInput { driver: &d, entries: &zeros, financing: &[] });
    assert!(none.is_none());
}

#[test]
fn telemetry_alone_makes_no_record() {
    let d = driver("d1", ContractorType::Renter, "290");
    let entries = vec![entry(Platform::Telemetry, "38.5", 0)];
    let r = calculator().compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] });
    assert!(r.is_none());
}

#[test]
fn fuel_only_week_still_produces_a_record() {
    let d = driver("d1", ContractorType::Affiliate, "0");
    let entries = vec![entry(Platform::FuelCard, "25", 0)];
    let r = calculator()
        .compute(WEEK, DriverWeekInput { driver: &d, entries: &entries, financing: &[] })
        .unwrap();
    assert_eq!(r.amounts.gross_ride_earnings, Decimal::ZERO);
    assert_eq!(r.amounts.net_payout, dec("-25"));
}

#[test]
fn compute_all_is_sorted_by_driver() {
    let b = driver("b", ContractorType::Affiliate, "0");
    let a = driver("a", ContractorType::Affiliate, "0");
    let idle = driver("c", ContractorType::Affiliate, "0");
    let entries = standard_week();
    let inputs = vec![
        DriverWeekInput { driver: &b, entries: &entries, financing: &[] },
        DriverWeekInput { driver: &idle, entries: &[], financing: &[] },
        DriverWeekInput { driver: &a, entries: &entries, financing: &[] },
    ];
    let records = calculator().compute_all(WEEK, &inputs);

    let ids: Vec<&str> = records.iter().map(|r| r.driver_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}
