//! Concurrent payments against one database file.
//!
//! Each thread opens its own connection, as separate processes would.

mod common;

use common::*;
use fleetpay_core::{
    config::PayrollConfig,
    engine::PayrollEngine,
    error::PayrollError,
    ledger::{LedgerRepository, PaymentLedger},
    store::PayrollStore,
    types::PaymentStatus,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn file_engine(path: &str) -> PayrollEngine {
    let store = PayrollStore::open(path).unwrap();
    store.migrate().unwrap();
    PayrollEngine::new(PayrollConfig::default_test(), store)
}

#[test]
fn concurrent_payments_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payroll.db").to_str().unwrap().to_string();

    let engine = file_engine(&path);
    seed_roster(&engine);
    process(&engine, WEEK, &full_week(&["renter", "affil"]));

    const THREADS: usize = 4;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                let store = PayrollStore::open(&path).unwrap();
                let request = fleetpay_core::ledger::PaymentRequest {
                    proof_ref: Some(format!("worker-{i}")),
                    ..payment(20)
                };
                barrier.wait();
                PaymentLedger::new(&store).record_payment(&rid(RENTER), &request)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");
    for r in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            r,
            Err(PayrollError::InvalidTransition { from: PaymentStatus::Paid, .. })
        ));
    }

    let history = engine.store().ledger_history(&rid(RENTER)).unwrap();
    assert_eq!(history.len(), 1, "exactly one ledger entry");
    let record = engine.store().get_record(&rid(RENTER)).unwrap().unwrap();
    assert_eq!(record.payment_status, PaymentStatus::Paid);
    assert!(engine.validate_integrity(None).unwrap().is_clean());
}

#[test]
fn recompute_and_payment_do_not_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payroll.db").to_str().unwrap().to_string();

    let engine = file_engine(&path);
    seed_roster(&engine);
    process(&engine, WEEK, &full_week(&["renter", "affil"]));

    let barrier = Arc::new(Barrier::new(2));
    let payer = {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        thread::spawn(move || {
            let store = PayrollStore::open(&path).unwrap();
            barrier.wait();
            PaymentLedger::new(&store).record_payment(&rid(AFFIL), &payment(20))
        })
    };
    let importer = {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        thread::spawn(move || {
            let engine = file_engine(&path);
            barrier.wait();
            let rows = vec![serde_json::json!({ "driver_uuid": "uuid-affil", "total_earnings": "900" })];
            process(&engine, WEEK, &[batch(fleetpay_core::types::Platform::RideA, rows)]);
        })
    };
    let paid = payer.join().unwrap().unwrap();
    importer.join().unwrap();

    // Whatever the interleaving, what was paid is what is served.
    let affil = engine.finalized_record(AFFIL, WEEK).unwrap().unwrap();
    assert_eq!(affil.payment_status, PaymentStatus::Paid);
    assert_eq!(affil.amounts.net_payout, paid.amount);
    assert!(engine.validate_integrity(None).unwrap().is_clean());
}
