//! payroll-runner: headless batch runner for the fleet payroll engine.
//!
//! Usage:
//!   payroll-runner --db payroll.db --week 2025-W03 \
//!       --roster roster.json --import ride_a=ride_a.json --import toll_tag=tolls.json
//!   payroll-runner --db payroll.db --list-weeks
//!   payroll-runner --db payroll.db --validate [--week 2025-W03]
//!   payroll-runner --db payroll.db --ipc-mode
//!
//! Import files hold a JSON array of row objects as exported by the platform.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use fleetpay_core::{
    config::PayrollConfig,
    engine::{PayrollEngine, WeekProcessingSummary},
    ledger::{IntegrityReport, PaymentRequest},
    normalizer::PlatformBatch,
    roster::{Driver, FinancingAgreement},
    store::PayrollStore,
    types::Platform,
    week::WeekWindow,
};
use rust_decimal::Decimal;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    ProcessWeek {
        week_id: String,
        batches: Vec<PlatformBatch>,
    },
    Records {
        week_id: String,
        driver_id: Option<String>,
    },
    AvailableWeeks,
    RecordPayment {
        record_id: String,
        proof_ref: Option<String>,
        amount: Option<Decimal>,
    },
    CancelPayment {
        record_id: String,
        reason: String,
    },
    ReissuePayment {
        record_id: String,
        reason: String,
    },
    Commissions {
        referrer_id: String,
        week_id: String,
    },
    EvaluateGoals {
        driver_id: String,
        week_id: String,
    },
    DriverKpi {
        driver_id: String,
        week_id: String,
    },
    Validate {
        week_id: Option<String>,
    },
    Quit,
}

#[derive(serde::Deserialize)]
struct RosterFile {
    drivers: Vec<Driver>,
    #[serde(default)]
    financing: Vec<FinancingAgreement>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let list_weeks = args.iter().any(|a| a == "--list-weeks");
    let validate = args.iter().any(|a| a == "--validate");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let week = arg_value(&args, "--week");
    let roster = arg_value(&args, "--roster");
    let imports: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "--import")
        .map(|w| w[1].as_str())
        .collect();

    let config = PayrollConfig::load(data_dir)?;
    let store = PayrollStore::open(db)?;
    store.migrate()?;
    let engine = PayrollEngine::new(config, store);

    if let Some(path) = roster {
        load_roster(&engine, path)?;
    }

    if ipc_mode {
        return run_ipc_loop(&engine);
    }

    if !imports.is_empty() {
        let week = week.ok_or_else(|| anyhow!("--import requires --week"))?;
        let window = WeekWindow::parse(week)?;
        let batches = imports
            .iter()
            .map(|arg| read_batch(arg))
            .collect::<Result<Vec<_>>>()?;
        let summary = engine.process_week(&window, &batches)?;
        print_summary(&engine, &summary)?;
    }

    if list_weeks {
        println!("Available weeks:");
        for w in engine.available_weeks()? {
            println!("  {w}");
        }
    }

    if validate {
        let report = engine.validate_integrity(week)?;
        print_integrity(&report);
    }

    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

/// `platform=path/to/rows.json`
fn read_batch(arg: &str) -> Result<PlatformBatch> {
    let (platform, path) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("--import expects platform=path, got '{arg}'"))?;
    let platform =
        Platform::parse(platform).ok_or_else(|| anyhow!("unknown platform '{platform}'"))?;
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
    Ok(PlatformBatch {
        platform,
        source_ref: path.to_string(),
        rows,
    })
}

fn load_roster(engine: &PayrollEngine, path: &str) -> Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let roster: RosterFile =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;

    // Referrers first so referred_by always points at an existing row.
    let mut drivers = roster.drivers;
    drivers.sort_by_key(|d| d.referred_by.is_some());
    for d in &drivers {
        engine.store().upsert_driver(d)?;
    }
    for f in &roster.financing {
        engine.store().upsert_financing(f)?;
    }
    log::info!(
        "roster loaded: {} drivers, {} financing agreements",
        drivers.len(),
        roster.financing.len()
    );
    Ok(())
}

fn run_ipc_loop(engine: &PayrollEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, cmd) {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &PayrollEngine, cmd: IpcCommand) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::ProcessWeek { week_id, batches } => {
            let window = WeekWindow::parse(&week_id)?;
            serde_json::to_value(engine.process_week(&window, &batches)?)?
        }
        IpcCommand::Records { week_id, driver_id } => {
            serde_json::to_value(engine.weekly_records(&week_id, driver_id.as_deref())?)?
        }
        IpcCommand::AvailableWeeks => serde_json::to_value(engine.available_weeks()?)?,
        IpcCommand::RecordPayment { record_id, proof_ref, amount } => {
            let request = PaymentRequest { paid_at: Utc::now(), proof_ref, amount };
            serde_json::to_value(engine.record_payment(&record_id, &request)?)?
        }
        IpcCommand::CancelPayment { record_id, reason } => {
            let previous = engine.cancel_payment(&record_id, &reason)?;
            serde_json::json!({ "record_id": record_id, "previous_status": previous })
        }
        IpcCommand::ReissuePayment { record_id, reason } => {
            let voided = engine.reissue_payment(&record_id, &reason)?;
            serde_json::json!({ "record_id": record_id, "voided_ledger_id": voided })
        }
        IpcCommand::Commissions { referrer_id, week_id } => {
            serde_json::to_value(engine.commissions(&referrer_id, &week_id)?)?
        }
        IpcCommand::EvaluateGoals { driver_id, week_id } => {
            serde_json::to_value(engine.evaluate_goals(&driver_id, &week_id)?)?
        }
        IpcCommand::DriverKpi { driver_id, week_id } => {
            serde_json::to_value(engine.driver_kpi(&driver_id, &week_id)?)?
        }
        IpcCommand::Validate { week_id } => {
            let report = engine.validate_integrity(week_id.as_deref())?;
            serde_json::json!({
                "clean": report.is_clean(),
                "orphans": report.orphans,
                "mismatched": report
                    .mismatched
                    .iter()
                    .map(|m| serde_json::json!({
                        "ledger_id": m.ledger_id,
                        "record_id": m.record_id,
                        "detail": m.detail,
                    }))
                    .collect::<Vec<_>>(),
                "dangling": report.dangling,
            })
        }
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn print_summary(engine: &PayrollEngine, summary: &WeekProcessingSummary) -> Result<()> {
    println!("=== Week {} ({}) ===", summary.week_id, summary.status.as_str());
    for p in &summary.platforms {
        match &p.error {
            None => println!(
                "  {:<10} {:>5} rows  {:>4} entries  {:>3} skipped  {:>3} clamped",
                p.platform.as_str(),
                p.rows_read,
                p.entries,
                p.skipped_rows,
                p.clamped
            ),
            Some(e) => println!("  {:<10} FAILED: {e}", p.platform.as_str()),
        }
    }
    for (platform, n) in &summary.unresolved {
        println!("  unresolved {platform}: {n}");
    }
    println!(
        "  records: {} computed, {} frozen, {} superseded",
        summary.records_computed, summary.records_frozen, summary.records_superseded
    );
    println!();

    let records = engine.weekly_records(&summary.week_id, None)?;
    println!("{:<16} {:>10} {:>10} {:>10} {:>10}  status", "driver", "gross", "fees", "deduct", "net");
    for r in &records {
        let a = &r.amounts;
        let fees = a.tax_amount + a.admin_fee_amount;
        let deductions = a.fuel_expense
            + if r.toll_deducted { a.toll_expense } else { Decimal::ZERO }
            + a.rental_expense
            + a.financing_installment;
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10}  {}",
            r.driver_id, a.gross_ride_earnings, fees, deductions, a.net_payout, r.payment_status
        );
    }
    let total: Decimal = records.iter().map(|r| r.amounts.net_payout).sum();
    println!("{:<16} {:>43}", "total", total);
    Ok(())
}

fn print_integrity(report: &IntegrityReport) {
    if report.is_clean() {
        println!("Integrity: clean");
        return;
    }
    println!("Integrity findings:");
    for o in &report.orphans {
        println!("  orphan     {o}");
    }
    for m in &report.mismatched {
        println!("  mismatch   {} / {}: {}", m.ledger_id, m.record_id, m.detail);
    }
    for d in &report.dangling {
        println!("  dangling   {d}");
    }
}
