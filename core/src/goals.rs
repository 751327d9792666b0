//! Weekly goals and their rewards.
//!
//! Evaluated fresh for each driver/week from the finalized record. A new
//! evaluation replaces whatever was stored for that driver/week before.

use crate::{
    calculator::DriverWeeklyRecord,
    error::PayrollResult,
    money::round2,
    types::{DriverId, WeekId},
    week::WeekWindow,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCriterion {
    /// Gross ride earnings.
    Earnings,
    Trips,
}

impl GoalCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCriterion::Earnings => "earnings",
            GoalCriterion::Trips    => "trips",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earnings" => Some(GoalCriterion::Earnings),
            "trips"    => Some(GoalCriterion::Trips),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Fixed,
    /// Percent of the week's gross ride earnings. Trips goals pay this on
    /// earnings too, never on the trip count.
    Percentage,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Fixed      => "fixed",
            RewardType::Percentage => "percentage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed"      => Some(RewardType::Fixed),
            "percentage" => Some(RewardType::Percentage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub criterion: GoalCriterion,
    pub reward_type: RewardType,
    pub threshold: Decimal,
    pub reward_value: Decimal,
    pub level: u32,
    pub active: bool,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAchievement {
    pub goal_id: String,
    pub driver_id: DriverId,
    pub week_id: WeekId,
    pub measured: Decimal,
    pub achieved: bool,
    pub reward: Decimal,
}

pub trait GoalRepository {
    fn goals(&self) -> PayrollResult<Vec<Goal>>;

    /// Delete and insert in one transaction.
    fn replace_achievements(
        &self,
        driver_id: &str,
        week_id: &str,
        achievements: &[GoalAchievement],
    ) -> PayrollResult<()>;

    fn achievements(&self, driver_id: &str, week_id: &str) -> PayrollResult<Vec<GoalAchievement>>;
}

/// Compare one record against every applicable goal.
///
/// A goal applies when it is active and started on or before the last day of
/// the week. Results are ordered by level, then goal id.
pub fn evaluate(goals: &[Goal], record: &DriverWeeklyRecord, window: &WeekWindow) -> Vec<GoalAchievement> {
    let mut applicable: Vec<&Goal> = goals
        .iter()
        .filter(|g| g.active && g.start_date <= window.end)
        .collect();
    applicable.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));

    applicable
        .into_iter()
        .map(|goal| {
            let measured = match goal.criterion {
                GoalCriterion::Earnings => record.amounts.gross_ride_earnings,
                GoalCriterion::Trips => Decimal::from(record.total_trips),
            };
            let achieved = measured >= goal.threshold;
            let reward = match (achieved, goal.reward_type) {
                (false, _) => Decimal::ZERO,
                (true, RewardType::Fixed) => goal.reward_value,
                (true, RewardType::Percentage) => round2(
                    record.amounts.gross_ride_earnings * goal.reward_value / Decimal::ONE_HUNDRED,
                ),
            };
            GoalAchievement {
                goal_id: goal.id.clone(),
                driver_id: record.driver_id.clone(),
                week_id: record.week_id.clone(),
                measured,
                achieved,
                reward,
            }
        })
        .collect()
}

pub struct GoalEvaluator<'a, S> {
    store: &'a S,
}

impl<'a, S: GoalRepository> GoalEvaluator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Evaluate and persist, replacing earlier results for the same week.
    pub fn evaluate_and_store(
        &self,
        record: &DriverWeeklyRecord,
        window: &WeekWindow,
    ) -> PayrollResult<Vec<GoalAchievement>> {
        let goals = self.store.goals()?;
        let results = evaluate(&goals, record, window);
        self.store
            .replace_achievements(&record.driver_id, &record.week_id, &results)?;
        log::debug!(
            "goals for {}: {}/{} achieved",
            record.id,
            results.iter().filter(|a| a.achieved).count(),
            results.len()
        );
        Ok(results)
    }
}
