// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly-goal consistency calculator.
//!
//! Runs after a session ends for a user: derives a rolling completion
//! ratio over the last 12 ISO weeks of weekly goals and stores it on the
//! user document.

use crate::models::session::Session;
use crate::models::user::{UserProfile, WeeklyGoal};
use crate::store::{collections, FieldUpdates, FieldValue, RemoteStore};
use crate::time_utils::Clock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Number of ISO weeks in the rolling window.
const CONSISTENCY_WINDOW_WEEKS: usize = 12;

/// Errors from progression operations.
#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Invalid goal value: {0}")]
    InvalidGoalValue(f64),

    #[error("A goal already exists for week {0}")]
    DuplicateGoalForWeek(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<crate::error::AppError> for ProgressionError {
    fn from(err: crate::error::AppError) -> Self {
        ProgressionError::Database(err.to_string())
    }
}

/// Three-tier classification of the consistency rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyTier {
    Excellent,
    Warning,
    Critical,
}

impl ConsistencyTier {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 0.75 {
            ConsistencyTier::Excellent
        } else if rate >= 0.50 {
            ConsistencyTier::Warning
        } else {
            ConsistencyTier::Critical
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    pub rate: f64,
    pub tier: ConsistencyTier,
    pub attempted: usize,
    pub completed: usize,
}

pub struct ProgressionService {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
}

impl ProgressionService {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Add a weekly goal to a user profile.
    pub async fn add_weekly_goal(
        &self,
        user_id: &str,
        goal: WeeklyGoal,
    ) -> Result<(), ProgressionError> {
        if goal.target_value <= 0.0 {
            return Err(ProgressionError::InvalidGoalValue(goal.target_value));
        }

        let mut user = self.load_user(user_id).await?;
        if user.weekly_goals.iter().any(|g| g.week == goal.week) {
            return Err(ProgressionError::DuplicateGoalForWeek(goal.week));
        }

        user.weekly_goals.push(goal);
        let mut updates = FieldUpdates::new();
        updates.insert(
            "weekly_goals".to_string(),
            FieldValue::json(&user.weekly_goals)?,
        );
        self.store
            .update_fields(collections::USERS, user_id, updates)
            .await?;
        Ok(())
    }

    /// Recompute the consistency rate after `session_id` ended for
    /// `user_id`, and persist it on the user document.
    pub async fn recompute_after_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<ConsistencyReport, ProgressionError> {
        let session_snapshot = self
            .store
            .get_document(collections::SESSIONS, session_id)
            .await?
            .ok_or_else(|| ProgressionError::InvalidSession(session_id.to_string()))?;
        let session: Session = session_snapshot
            .decode()
            .map_err(|_| ProgressionError::InvalidSession(session_id.to_string()))?;
        if !session.is_ended() {
            return Err(ProgressionError::InvalidSession(format!(
                "{} has not ended",
                session_id
            )));
        }

        let user = self.load_user(user_id).await?;
        let report = compute_consistency(&user.weekly_goals, self.window_keys());

        let mut updates = FieldUpdates::new();
        updates.insert(
            "consistency_rate".to_string(),
            FieldValue::Json(serde_json::json!(report.rate)),
        );
        self.store
            .update_fields(collections::USERS, user_id, updates)
            .await?;

        tracing::info!(
            user_id,
            session_id,
            rate = report.rate,
            tier = ?report.tier,
            "Recomputed consistency rate"
        );
        Ok(report)
    }

    async fn load_user(&self, user_id: &str) -> Result<UserProfile, ProgressionError> {
        let snapshot = self
            .store
            .get_document(collections::USERS, user_id)
            .await?
            .ok_or_else(|| ProgressionError::UserNotFound(user_id.to_string()))?;
        snapshot
            .decode()
            .map_err(|_| ProgressionError::UserNotFound(user_id.to_string()))
    }

    /// ISO week keys covering the rolling window ending now.
    fn window_keys(&self) -> HashSet<String> {
        let now = self.clock.now();
        (0..CONSISTENCY_WINDOW_WEEKS)
            .map(|i| WeeklyGoal::week_key(now - chrono::Duration::weeks(i as i64)))
            .collect()
    }
}

fn compute_consistency(goals: &[WeeklyGoal], window: HashSet<String>) -> ConsistencyReport {
    let in_window: Vec<&WeeklyGoal> = goals
        .iter()
        .filter(|g| window.contains(&g.week) && g.target_value > 0.0)
        .collect();

    let attempted = in_window.len();
    let completed = in_window.iter().filter(|g| g.is_completed).count();
    let rate = if attempted == 0 {
        0.0
    } else {
        completed as f64 / attempted as f64
    };

    ConsistencyReport {
        rate,
        tier: ConsistencyTier::from_rate(rate),
        attempted,
        completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ConsistencyTier::from_rate(1.0), ConsistencyTier::Excellent);
        assert_eq!(ConsistencyTier::from_rate(0.75), ConsistencyTier::Excellent);
        assert_eq!(ConsistencyTier::from_rate(0.74), ConsistencyTier::Warning);
        assert_eq!(ConsistencyTier::from_rate(0.50), ConsistencyTier::Warning);
        assert_eq!(ConsistencyTier::from_rate(0.49), ConsistencyTier::Critical);
        assert_eq!(ConsistencyTier::from_rate(0.0), ConsistencyTier::Critical);
    }

    #[test]
    fn test_compute_consistency_window() {
        let goals = vec![
            WeeklyGoal {
                week: "2026-W30".into(),
                target_value: 10.0,
                is_completed: true,
            },
            WeeklyGoal {
                week: "2026-W31".into(),
                target_value: 10.0,
                is_completed: false,
            },
            // Outside the window: ignored.
            WeeklyGoal {
                week: "2020-W01".into(),
                target_value: 10.0,
                is_completed: true,
            },
            // Zero target: not attempted.
            WeeklyGoal {
                week: "2026-W29".into(),
                target_value: 0.0,
                is_completed: false,
            },
        ];
        let window: HashSet<String> = ["2026-W29", "2026-W30", "2026-W31"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = compute_consistency(&goals, window);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.completed, 1);
        assert!((report.rate - 0.5).abs() < 1e-9);
        assert_eq!(report.tier, ConsistencyTier::Warning);
    }

    #[test]
    fn test_no_attempted_goals_is_critical() {
        let report = compute_consistency(&[], HashSet::new());
        assert_eq!(report.attempted, 0);
        assert_eq!(report.rate, 0.0);
        assert_eq!(report.tier, ConsistencyTier::Critical);
    }
}
