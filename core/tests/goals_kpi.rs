//! Integration tests for goal evaluation and performance KPIs.

mod common;

use chrono::NaiveDate;
use common::*;
use fleetpay_core::{
    engine::PayrollEngine,
    error::PayrollError,
    goals::{Goal, GoalCriterion, RewardType},
    kpi::PerformanceSample,
    types::Platform,
};

fn goal(id: &str, criterion: GoalCriterion, threshold: &str, reward_type: RewardType, value: &str, level: u32) -> Goal {
    Goal {
        id: id.to_string(),
        name: id.replace('-', " "),
        criterion,
        reward_type,
        threshold: dec(threshold),
        reward_value: dec(value),
        level,
        active: true,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    }
}

fn seed_goals(engine: &PayrollEngine) {
    let goals = [
        goal("earn-400", GoalCriterion::Earnings, "400", RewardType::Fixed, "25", 1),
        goal("trips-40", GoalCriterion::Trips, "40", RewardType::Percentage, "2", 2),
        goal("earn-500-bonus", GoalCriterion::Earnings, "500", RewardType::Percentage, "3", 2),
        goal("earn-1000", GoalCriterion::Earnings, "1000", RewardType::Fixed, "100", 3),
    ];
    for g in &goals {
        engine.store().upsert_goal(g).unwrap();
    }
    let mut later = goal("february-push", GoalCriterion::Trips, "1", RewardType::Fixed, "10", 1);
    later.start_date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    engine.store().upsert_goal(&later).unwrap();
}

fn sample(acceptance: f64, rating: f64, hours: Option<f64>) -> PerformanceSample {
    PerformanceSample {
        driver_id: RENTER.into(),
        week_id: WEEK.into(),
        acceptance_rate: acceptance,
        passenger_rating: rating,
        active_hours: hours,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Goals
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn goals_are_evaluated_in_level_order() {
    let engine = processed_engine();
    seed_goals(&engine);

    let results = engine.evaluate_goals(RENTER, WEEK).unwrap();
    let ids: Vec<&str> = results.iter().map(|a| a.goal_id.as_str()).collect();
    assert_eq!(ids, vec!["earn-400", "earn-500-bonus", "trips-40", "earn-1000"]);

    let earn = &results[0];
    assert!(earn.achieved);
    assert_eq!(earn.measured, dec("500"));
    assert_eq!(earn.reward, dec("25"));

    let bonus = &results[1];
    assert!(bonus.achieved, "threshold is inclusive");
    assert_eq!(bonus.reward, dec("15.00"));

    let trips = &results[2];
    assert!(!trips.achieved);
    assert_eq!(trips.measured, dec("32"));
    assert_eq!(trips.reward, dec("0"));

    assert!(!results[3].achieved);
}

#[test]
fn reevaluation_replaces_stored_results() {
    let engine = processed_engine();
    seed_goals(&engine);
    engine.evaluate_goals(RENTER, WEEK).unwrap();
    assert_eq!(engine.goal_achievements(RENTER, WEEK).unwrap().len(), 4);

    let mut retired = goal("earn-1000", GoalCriterion::Earnings, "1000", RewardType::Fixed, "100", 3);
    retired.active = false;
    engine.store().upsert_goal(&retired).unwrap();
    engine.evaluate_goals(RENTER, WEEK).unwrap();

    let stored = engine.goal_achievements(RENTER, WEEK).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|a| a.goal_id != "earn-1000"));
}

#[test]
fn goals_read_the_paid_record() {
    let engine = processed_engine();
    seed_goals(&engine);
    engine.record_payment(&rid(RENTER), &payment(20)).unwrap();
    let rows = vec![serde_json::json!({ "driver_uuid": "uuid-renter", "total_earnings": "100" })];
    process(&engine, WEEK, &[batch(Platform::RideA, rows)]);

    let results = engine.evaluate_goals(RENTER, WEEK).unwrap();
    assert_eq!(results[0].measured, dec("500"));
    assert!(results[0].achieved);
}

#[test]
fn goals_need_a_record() {
    let engine = processed_engine();
    seed_goals(&engine);
    let err = engine.evaluate_goals(RENTER, "2025-W10").unwrap_err();
    assert!(matches!(err, PayrollError::RecordNotFound { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// KPI
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn kpi_combines_record_sample_and_telemetry() {
    let engine = engine();
    seed_roster(&engine);
    let mut batches = full_week(&["renter"]);
    batches.push(batch(Platform::Telemetry, vec![row(Platform::Telemetry, "renter")]));
    process(&engine, WEEK, &batches);
    engine.record_performance(&sample(95.0, 4.95, None)).unwrap();

    let kpi = engine.driver_kpi(RENTER, WEEK).unwrap();
    assert_close(kpi.inputs.weekly_revenue, 500.0);
    assert_close(kpi.inputs.active_hours, 35.0);
    assert_close(kpi.revenue_score, 22.22);
    assert_close(kpi.acceptance_score, 100.0);
    assert_close(kpi.rating_score, 100.0);
    assert_close(kpi.recruitment_score, 0.0);
    assert_close(kpi.hours_score, 50.0);
    assert_close(kpi.overall, 56.67);
    assert_eq!(kpi.tier, "bronze");
}

#[test]
fn reported_hours_override_telemetry() {
    let engine = engine();
    seed_roster(&engine);
    let mut batches = full_week(&["renter"]);
    batches.push(batch(Platform::Telemetry, vec![row(Platform::Telemetry, "renter")]));
    process(&engine, WEEK, &batches);
    engine.record_performance(&sample(95.0, 4.95, Some(50.0))).unwrap();

    let kpi = engine.driver_kpi(RENTER, WEEK).unwrap();
    assert_close(kpi.hours_score, 100.0);
    assert_close(kpi.overall, 61.67);
    assert_eq!(kpi.tier, "silver");
}

#[test]
fn active_recruits_raise_the_score() {
    let engine = processed_engine();
    engine.record_performance(&sample(95.0, 4.95, Some(35.0))).unwrap();
    let invite = engine.issue_invite(RENTER, at(10)).unwrap();
    engine.accept_invite(&invite.code, AFFIL, at(11)).unwrap();

    let kpi = engine.driver_kpi(RENTER, WEEK).unwrap();
    assert_close(kpi.inputs.active_recruits, 1.0);
    assert_close(kpi.recruitment_score, 20.0);
    assert_close(kpi.overall, 59.67);
}

#[test]
fn driver_without_data_is_a_beginner() {
    let engine = engine();
    seed_roster(&engine);
    let kpi = engine.driver_kpi(AFFIL, WEEK).unwrap();
    assert_close(kpi.overall, 0.0);
    assert_eq!(kpi.tier, "beginner");
}

#[test]
fn unknown_driver_has_no_kpi() {
    let engine = engine();
    assert!(matches!(
        engine.driver_kpi("ghost", WEEK).unwrap_err(),
        PayrollError::DriverNotFound { .. }
    ));
}
