//! Driver resolution fallback chain: carried id → integration → plate.

use fleetpay_core::{
    normalizer::NormalizedWeeklyEntry,
    resolver::{DriverResolver, MatchKind, Resolution},
    roster::Driver,
    types::{ContractorType, DriverStatus, Platform},
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn driver(id: &str, integrations: &[(Platform, &str)], plate: Option<&str>) -> Driver {
    Driver {
        id: id.to_string(),
        name: id.to_uppercase(),
        contractor_type: if plate.is_some() { ContractorType::Renter } else { ContractorType::Affiliate },
        rental_fee_per_week: Decimal::ZERO,
        integrations: integrations
            .iter()
            .map(|(p, r)| (*p, r.to_string()))
            .collect::<BTreeMap<_, _>>(),
        vehicle_plate: plate.map(str::to_string),
        referred_by: None,
        status: DriverStatus::Active,
    }
}

fn entry(platform: Platform, reference: &str, carried: Option<&str>) -> NormalizedWeeklyEntry {
    NormalizedWeeklyEntry {
        week_id: "2025-W03".into(),
        platform,
        reference_id: reference.to_string(),
        reference_label: None,
        driver_id: carried.map(str::to_string),
        total_value: Decimal::ONE,
        total_trips: 0,
        source_ref: "test".into(),
        row_count: 1,
    }
}

fn roster() -> Vec<Driver> {
    vec![
        driver("d1", &[(Platform::RideA, "UUID-1"), (Platform::FuelCard, "7001 0001")], Some("AA-12-BB")),
        driver("d2", &[(Platform::RideB, "two@fleet.pt")], None),
    ]
}

fn matched(resolution: Resolution) -> (String, MatchKind) {
    match resolution {
        Resolution::Matched { driver_id, via } => (driver_id, via),
        Resolution::Unresolved => panic!("expected a match"),
    }
}

#[test]
fn carried_driver_id_wins_over_integration() {
    let r = DriverResolver::build(&roster());
    let (id, via) = matched(r.resolve(&entry(Platform::RideA, "uuid-1", Some("d2"))));
    assert_eq!(id, "d2");
    assert_eq!(via, MatchKind::DriverId);
}

#[test]
fn integration_reference_is_case_insensitive() {
    let r = DriverResolver::build(&roster());
    let (id, via) = matched(r.resolve(&entry(Platform::RideA, "uuid-1", None)));
    assert_eq!(id, "d1");
    assert_eq!(via, MatchKind::Integration);

    let (id, _) = matched(r.resolve(&entry(Platform::FuelCard, "70010001", None)));
    assert_eq!(id, "d1");
}

#[test]
fn unknown_carried_id_falls_through() {
    let r = DriverResolver::build(&roster());
    let (id, via) = matched(r.resolve(&entry(Platform::RideB, "two@fleet.pt", Some("ghost"))));
    assert_eq!(id, "d2");
    assert_eq!(via, MatchKind::Integration);
}

#[test]
fn plate_is_the_last_resort() {
    let r = DriverResolver::build(&roster());
    let (id, via) = matched(r.resolve(&entry(Platform::TollTag, "aa12bb", None)));
    assert_eq!(id, "d1");
    assert_eq!(via, MatchKind::Plate);
}

#[test]
fn inactive_drivers_are_not_indexed() {
    let mut drivers = roster();
    drivers[1].status = DriverStatus::Inactive;
    let r = DriverResolver::build(&drivers);

    assert!(r.driver("d2").is_none());
    assert_eq!(r.resolve(&entry(Platform::RideB, "two@fleet.pt", None)), Resolution::Unresolved);
}

#[test]
fn misses_are_counted_per_platform() {
    let r = DriverResolver::build(&roster());
    let resolved = r.resolve_all(vec![
        entry(Platform::RideA, "uuid-1", None),
        entry(Platform::RideA, "nobody", None),
        entry(Platform::TollTag, "zz99zz", None),
        entry(Platform::TollTag, "yy88yy", None),
    ]);

    assert_eq!(resolved.by_driver["d1"].len(), 1);
    assert_eq!(resolved.unresolved[&Platform::RideA], 1);
    assert_eq!(resolved.unresolved[&Platform::TollTag], 2);
    assert_eq!(resolved.unresolved_total(), 3);
}
