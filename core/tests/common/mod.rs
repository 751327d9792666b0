//! Fixtures shared by the engine-level integration tests.
//!
//! Two drivers, each earning 300 on ride_a and 200 on ride_b with 40 of
//! fuel and 15 of tolls per week:
//!   d-renter  rents AA-12-BB for 290/week  → net 92.10
//!   d-affil   own vehicle CC-34-DD         → net 397.10
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use fleetpay_core::{
    engine::{PayrollEngine, WeekProcessingSummary},
    ledger::PaymentRequest,
    normalizer::PlatformBatch,
    roster::Driver,
    types::{ContractorType, DriverStatus, Platform},
    week::WeekWindow,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const WEEK: &str = "2025-W03";
pub const RENTER: &str = "d-renter";
pub const AFFIL: &str = "d-affil";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
}

pub fn engine() -> PayrollEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    PayrollEngine::build_test().expect("build_test failed")
}

/// Fixture key ("renter" / "affil") → driver id.
fn id_of(key: &str) -> String {
    format!("d-{key}")
}

fn plate_of(key: &str) -> &'static str {
    match key {
        "renter" => "AA-12-BB",
        "affil" => "CC-34-DD",
        _ => "ZZ-99-ZZ",
    }
}

fn card_of(key: &str) -> &'static str {
    match key {
        "renter" => "7001 0001",
        "affil" => "7001 0002",
        _ => "7001 9999",
    }
}

pub fn fixture_driver(key: &str) -> Driver {
    let renter = key == "renter";
    let integrations = BTreeMap::from([
        (Platform::RideA, format!("uuid-{key}")),
        (Platform::RideB, format!("{key}@fleet.pt")),
        (Platform::FuelCard, card_of(key).to_string()),
    ]);
    Driver {
        id: id_of(key),
        name: key.to_uppercase(),
        contractor_type: if renter { ContractorType::Renter } else { ContractorType::Affiliate },
        rental_fee_per_week: if renter { dec("290") } else { Decimal::ZERO },
        integrations,
        vehicle_plate: Some(plate_of(key).to_string()),
        referred_by: None,
        status: DriverStatus::Active,
    }
}

/// A plain affiliate with a ride_a account only.
pub fn simple_driver(id: &str, referred_by: Option<&str>) -> Driver {
    Driver {
        id: id.to_string(),
        name: id.to_uppercase(),
        contractor_type: ContractorType::Affiliate,
        rental_fee_per_week: Decimal::ZERO,
        integrations: BTreeMap::from([(Platform::RideA, format!("uuid-{id}"))]),
        vehicle_plate: None,
        referred_by: referred_by.map(str::to_string),
        status: DriverStatus::Active,
    }
}

pub fn seed_roster(engine: &PayrollEngine) {
    engine.store().upsert_driver(&fixture_driver("renter")).unwrap();
    engine.store().upsert_driver(&fixture_driver("affil")).unwrap();
}

pub fn row(platform: Platform, key: &str) -> Value {
    match platform {
        Platform::RideA => json!({ "driver_uuid": format!("uuid-{key}"), "total_earnings": "300", "trips": 20 }),
        Platform::RideB => json!({ "driver_email": format!("{key}@fleet.pt"), "net_earnings": "200,00", "finished_rides": 12 }),
        Platform::FuelCard => json!({ "card_number": card_of(key), "total_value": "40" }),
        Platform::TollTag => json!({ "license_plate": plate_of(key), "value": "15" }),
        Platform::Telemetry => json!({ "vehicle_plate": plate_of(key), "active_hours": "35" }),
    }
}

pub fn batch(platform: Platform, rows: Vec<Value>) -> PlatformBatch {
    PlatformBatch {
        platform,
        source_ref: format!("{platform}.json"),
        rows,
    }
}

/// The four money platforms with standard rows for `keys`.
pub fn full_week(keys: &[&str]) -> Vec<PlatformBatch> {
    [Platform::RideA, Platform::RideB, Platform::FuelCard, Platform::TollTag]
        .into_iter()
        .map(|p| batch(p, keys.iter().map(|k| row(p, k)).collect()))
        .collect()
}

pub fn process(engine: &PayrollEngine, week: &str, batches: &[PlatformBatch]) -> WeekProcessingSummary {
    let window = WeekWindow::parse(week).unwrap();
    engine.process_week(&window, batches).expect("process_week failed")
}

/// Roster seeded and the standard week processed for both drivers.
pub fn processed_engine() -> PayrollEngine {
    let engine = engine();
    seed_roster(&engine);
    process(&engine, WEEK, &full_week(&["renter", "affil"]));
    engine
}

pub fn payment(day: u32) -> PaymentRequest {
    PaymentRequest {
        paid_at: at(day),
        proof_ref: Some(format!("transfer-{day}")),
        amount: None,
    }
}

pub fn rid(driver_id: &str) -> String {
    format!("{driver_id}:{WEEK}")
}
