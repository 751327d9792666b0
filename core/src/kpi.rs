//! Performance KPI scoring.
//!
//! Each input is mapped to 0–100 by clamped linear interpolation between its
//! minimum and excellence targets. The overall score is the weighted sum and
//! selects a tier from the configured breakpoints.

use crate::{
    config::{KpiConfig, KpiTarget},
    error::PayrollResult,
    types::{DriverId, WeekId},
};
use serde::{Deserialize, Serialize};

/// Self-reported or platform-provided quality figures for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub driver_id: DriverId,
    pub week_id: WeekId,
    /// Percent, 0–100.
    pub acceptance_rate: f64,
    pub passenger_rating: f64,
    /// When absent, hours come from telemetry.
    pub active_hours: Option<f64>,
}

pub trait PerformanceRepository {
    fn upsert_performance_sample(&self, sample: &PerformanceSample) -> PayrollResult<()>;

    fn performance_sample(&self, driver_id: &str, week_id: &str) -> PayrollResult<Option<PerformanceSample>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiInputs {
    pub weekly_revenue: f64,
    pub acceptance_rate: f64,
    pub passenger_rating: f64,
    pub active_recruits: f64,
    pub active_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceKpi {
    pub driver_id: DriverId,
    pub week_id: WeekId,
    pub inputs: KpiInputs,
    pub revenue_score: f64,
    pub acceptance_score: f64,
    pub rating_score: f64,
    pub recruitment_score: f64,
    pub hours_score: f64,
    pub overall: f64,
    pub tier: String,
}

/// 0 at or below `min`, 100 at or above `excellence`, linear between.
pub fn interpolate(value: f64, target: KpiTarget) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let span = target.excellence - target.min;
    if span <= 0.0 {
        return if value >= target.excellence { 100.0 } else { 0.0 };
    }
    ((value - target.min) / span * 100.0).clamp(0.0, 100.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub struct KpiScorer {
    config: KpiConfig,
}

impl KpiScorer {
    pub fn new(config: KpiConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, driver_id: &str, week_id: &str, inputs: KpiInputs) -> PerformanceKpi {
        let t = &self.config.targets;
        let w = &self.config.weights;

        let revenue_score = round2(interpolate(inputs.weekly_revenue, t.revenue));
        let acceptance_score = round2(interpolate(inputs.acceptance_rate, t.acceptance));
        let rating_score = round2(interpolate(inputs.passenger_rating, t.rating));
        let recruitment_score = round2(interpolate(inputs.active_recruits, t.recruitment));
        let hours_score = round2(interpolate(inputs.active_hours, t.hours));

        let overall = round2(
            (revenue_score * w.revenue
                + acceptance_score * w.acceptance
                + rating_score * w.rating
                + recruitment_score * w.recruitment
                + hours_score * w.hours)
                .clamp(0.0, 100.0),
        );

        PerformanceKpi {
            driver_id: driver_id.to_string(),
            week_id: week_id.to_string(),
            inputs,
            revenue_score,
            acceptance_score,
            rating_score,
            recruitment_score,
            hours_score,
            overall,
            tier: self.tier(overall).to_string(),
        }
    }

    /// Highest breakpoint whose minimum the score reaches.
    pub fn tier(&self, overall: f64) -> &str {
        self.config
            .tiers
            .iter()
            .rev()
            .find(|b| overall >= b.min_score)
            .or_else(|| self.config.tiers.first())
            .map(|b| b.tier.as_str())
            .unwrap_or("")
    }
}
