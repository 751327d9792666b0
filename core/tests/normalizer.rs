//! Normalizer behaviour on messy platform exports.
//!
//! 1. Column aliases are matched in priority order, case-insensitively
//! 2. Locale-formatted amounts parse to the same decimal
//! 3. Bad rows are skipped and counted, never raised
//! 4. Rows sharing a reference key aggregate into one entry
//! 5. Only unreadable batches fail the platform

use fleetpay_core::{
    error::PayrollError,
    normalizer::{Normalizer, PlatformBatch},
    types::Platform,
    week::WeekWindow,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn normalizer() -> Normalizer {
    Normalizer::new(WeekWindow::parse("2025-W03").unwrap())
}

fn batch(platform: Platform, rows: Vec<Value>) -> PlatformBatch {
    PlatformBatch {
        platform,
        source_ref: format!("{platform}-export.json"),
        rows,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aliases and parsing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn locale_amounts_parse_identically() {
    let rows = vec![
        json!({ "driver_uuid": "a", "total_earnings": "1.234,56" }),
        json!({ "driver_uuid": "b", "total_earnings": "1234.56" }),
        json!({ "driver_uuid": "c", "total_earnings": "€ 50" }),
        json!({ "driver_uuid": "d", "total_earnings": "1,234.56" }),
        json!({ "driver_uuid": "e", "total_earnings": 12.5 }),
        json!({ "driver_uuid": "f", "total_earnings": "12,5" }),
    ];
    let out = normalizer().normalize(&batch(Platform::RideA, rows)).unwrap();

    let values: Vec<Decimal> = out.entries.iter().map(|e| e.total_value).collect();
    assert_eq!(
        values,
        vec![dec("1234.56"), dec("1234.56"), dec("50"), dec("1234.56"), dec("12.5"), dec("12.5")]
    );
}

#[test]
fn first_non_empty_alias_wins() {
    // "driver_uuid" outranks "email" but is blank here, so email is used.
    let rows = vec![json!({
        "Driver_UUID": "  ",
        "EMAIL": "Someone@Fleet.PT",
        "Ganhos totais": "10,00",
        "earnings": "999",
    })];
    let out = normalizer().normalize(&batch(Platform::RideA, rows)).unwrap();

    assert_eq!(out.entries.len(), 1);
    assert_eq!(out.entries[0].reference_id, "someone@fleet.pt");
    assert_eq!(out.entries[0].total_value, dec("10.00"));
}

#[test]
fn plate_keys_are_stripped_of_punctuation() {
    let rows = vec![
        json!({ "license_plate": "AA-12-BB", "value": "5,00" }),
        json!({ "Matrícula": "aa 12 bb", "Valor": "2,50" }),
    ];
    let out = normalizer().normalize(&batch(Platform::TollTag, rows)).unwrap();

    assert_eq!(out.entries.len(), 1);
    assert_eq!(out.entries[0].reference_id, "aa12bb");
    assert_eq!(out.entries[0].total_value, dec("7.50"));
    assert_eq!(out.entries[0].row_count, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Skips and aggregation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn bad_rows_are_counted_not_raised() {
    let rows = vec![
        json!({ "total_earnings": "10" }),                        // no reference
        json!({ "driver_uuid": "a", "total_earnings": "n/a" }),   // unparsable
        json!({ "driver_uuid": "a", "trips": 3 }),                // no amount: 0
        json!({ "driver_uuid": "a", "total_earnings": "20", "trips": "x" }),
    ];
    let out = normalizer().normalize(&batch(Platform::RideA, rows)).unwrap();

    assert_eq!(out.rows_read, 4);
    assert_eq!(out.missing_reference, 1);
    assert_eq!(out.unparsable_amount, 1);
    assert_eq!(out.skipped_rows(), 2);
    assert_eq!(out.entries.len(), 1);
    assert_eq!(out.entries[0].total_value, dec("20"));
    assert_eq!(out.entries[0].total_trips, 3, "non-numeric trips count as 0");
}

#[test]
fn same_key_rows_aggregate_in_first_seen_order() {
    let rows = vec![
        json!({ "driver_email": "z@x.pt", "net_earnings": "10", "finished_rides": 1 }),
        json!({ "driver_email": "a@x.pt", "net_earnings": "5", "finished_rides": 2 }),
        json!({ "driver_email": "Z@X.PT", "net_earnings": "7,5", "finished_rides": 4 }),
    ];
    let out = normalizer().normalize(&batch(Platform::RideB, rows)).unwrap();

    let keys: Vec<&str> = out.entries.iter().map(|e| e.reference_id.as_str()).collect();
    assert_eq!(keys, vec!["z@x.pt", "a@x.pt"]);
    assert_eq!(out.entries[0].total_value, dec("17.5"));
    assert_eq!(out.entries[0].total_trips, 5);
    assert!(out.entries.iter().all(|e| e.week_id == "2025-W03"));
}

#[test]
fn negative_aggregate_is_clamped_to_zero() {
    let rows = vec![
        json!({ "card_number": "7001 0001", "total_value": "-30,00" }),
        json!({ "card_number": "7001-0001", "total_value": "10,00" }),
    ];
    let out = normalizer().normalize(&batch(Platform::FuelCard, rows)).unwrap();

    assert_eq!(out.clamped, 1);
    assert_eq!(out.entries[0].total_value, Decimal::ZERO);
}

#[test]
fn carried_driver_id_is_kept() {
    let rows = vec![json!({ "driver_id": "d-7", "driver_uuid": "u-7", "total_earnings": "1" })];
    let out = normalizer().normalize(&batch(Platform::RideA, rows)).unwrap();
    assert_eq!(out.entries[0].driver_id.as_deref(), Some("d-7"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Whole-platform failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn non_object_row_fails_the_platform() {
    let rows = vec![json!({ "driver_uuid": "a", "total_earnings": "1" }), json!("garbage")];
    let err = normalizer().normalize(&batch(Platform::RideA, rows)).unwrap_err();
    assert!(matches!(err, PayrollError::PlatformParse { platform: Platform::RideA, .. }));
}

#[test]
fn unrecognised_columns_fail_the_platform() {
    let rows = vec![json!({ "foo": 1, "bar": "2" })];
    let err = normalizer().normalize(&batch(Platform::FuelCard, rows)).unwrap_err();
    assert!(matches!(err, PayrollError::PlatformParse { .. }));
}

#[test]
fn empty_batch_is_not_an_error() {
    let out = normalizer().normalize(&batch(Platform::TollTag, vec![])).unwrap();
    assert!(out.entries.is_empty());
}

#[test]
fn normalize_all_isolates_failures() {
    let batches = vec![
        batch(Platform::RideA, vec![json!({ "driver_uuid": "a", "total_earnings": "1" })]),
        batch(Platform::RideB, vec![json!(42)]),
    ];
    let results = normalizer().normalize_all(&batches);

    assert_eq!(results[0].0, Platform::RideA);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, Platform::RideB);
    assert!(results[1].1.is_err());
}
