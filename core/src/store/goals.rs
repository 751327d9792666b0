use super::{dec, get_date, get_dec, get_enum, PayrollStore};
use crate::{
    error::PayrollResult,
    goals::{Goal, GoalAchievement, GoalCriterion, GoalRepository, RewardType},
    kpi::{PerformanceRepository, PerformanceSample},
};
use rusqlite::{params, OptionalExtension};

impl PayrollStore {
    pub fn upsert_goal(&self, g: &Goal) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO goal (id, name, criterion, reward_type, threshold, reward_value,
                               level, active, start_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                criterion = excluded.criterion,
                reward_type = excluded.reward_type,
                threshold = excluded.threshold,
                reward_value = excluded.reward_value,
                level = excluded.level,
                active = excluded.active,
                start_date = excluded.start_date",
            params![
                g.id,
                g.name,
                g.criterion.as_str(),
                g.reward_type.as_str(),
                dec(&g.threshold),
                dec(&g.reward_value),
                g.level,
                g.active,
                g.start_date.format("%Y-%m-%d").to_string(),
            ],
        )?;
        Ok(())
    }
}

impl GoalRepository for PayrollStore {
    fn goals(&self) -> PayrollResult<Vec<Goal>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, criterion, reward_type, threshold, reward_value,
                    level, active, start_date
             FROM goal ORDER BY level ASC, id ASC",
        )?;
        let goals = stmt
            .query_map([], |row| {
                Ok(Goal {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    criterion: get_enum(row, 2, GoalCriterion::parse)?,
                    reward_type: get_enum(row, 3, RewardType::parse)?,
                    threshold: get_dec(row, 4)?,
                    reward_value: get_dec(row, 5)?,
                    level: row.get(6)?,
                    active: row.get(7)?,
                    start_date: get_date(row, 8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    fn replace_achievements(
        &self,
        driver_id: &str,
        week_id: &str,
        achievements: &[GoalAchievement],
    ) -> PayrollResult<()> {
        self.write_tx(|conn| {
            conn.execute(
                "DELETE FROM goal_achievement WHERE driver_id = ?1 AND week_id = ?2",
                params![driver_id, week_id],
            )?;
            for a in achievements {
                conn.execute(
                    "INSERT INTO goal_achievement
                     (goal_id, driver_id, week_id, measured, achieved, reward)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        a.goal_id,
                        a.driver_id,
                        a.week_id,
                        dec(&a.measured),
                        a.achieved,
                        dec(&a.reward),
                    ],
                )?;
            }
            Ok(())
        })
    }

    fn achievements(&self, driver_id: &str, week_id: &str) -> PayrollResult<Vec<GoalAchievement>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.goal_id, a.driver_id, a.week_id, a.measured, a.achieved, a.reward
             FROM goal_achievement a
             JOIN goal g ON g.id = a.goal_id
             WHERE a.driver_id = ?1 AND a.week_id = ?2
             ORDER BY g.level ASC, a.goal_id ASC",
        )?;
        let rows = stmt
            .query_map(params![driver_id, week_id], |row| {
                Ok(GoalAchievement {
                    goal_id: row.get(0)?,
                    driver_id: row.get(1)?,
                    week_id: row.get(2)?,
                    measured: get_dec(row, 3)?,
                    achieved: row.get(4)?,
                    reward: get_dec(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PerformanceRepository for PayrollStore {
    fn upsert_performance_sample(&self, s: &PerformanceSample) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO performance_sample
             (driver_id, week_id, acceptance_rate, passenger_rating, active_hours)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(driver_id, week_id) DO UPDATE SET
                acceptance_rate = excluded.acceptance_rate,
                passenger_rating = excluded.passenger_rating,
                active_hours = excluded.active_hours",
            params![
                s.driver_id,
                s.week_id,
                s.acceptance_rate,
                s.passenger_rating,
                s.active_hours,
            ],
        )?;
        Ok(())
    }

    fn performance_sample(&self, driver_id: &str, week_id: &str) -> PayrollResult<Option<PerformanceSample>> {
        let sample = self
            .conn
            .query_row(
                "SELECT driver_id, week_id, acceptance_rate, passenger_rating, active_hours
                 FROM performance_sample WHERE driver_id = ?1 AND week_id = ?2",
                params![driver_id, week_id],
                |row| {
                    Ok(PerformanceSample {
                        driver_id: row.get(0)?,
                        week_id: row.get(1)?,
                        acceptance_rate: row.get(2)?,
                        passenger_rating: row.get(3)?,
                        active_hours: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(sample)
    }
}
