// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile and weekly goal models.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// One weekly goal. A goal with `target_value > 0` counts as attempted;
/// `is_completed` marks success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyGoal {
    /// ISO week key, e.g. "2026-W31".
    pub week: String,
    #[serde(default)]
    pub target_value: f64,
    #[serde(default)]
    pub is_completed: bool,
}

impl WeeklyGoal {
    /// ISO week key for a given date.
    pub fn week_key(date: DateTime<Utc>) -> String {
        let iso = date.iso_week();
        format!("{}-W{:02}", iso.year(), iso.week())
    }
}

/// Stored user document (`users/{userId}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub weekly_goals: Vec<WeeklyGoal>,
    #[serde(default)]
    pub consistency_rate: f64,
    #[serde(default)]
    pub squads: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_key_format() {
        let date: DateTime<Utc> = "2026-08-06T12:00:00Z".parse().unwrap();
        assert_eq!(WeeklyGoal::week_key(date), "2026-W32");
    }

    #[test]
    fn test_week_key_year_boundary() {
        // 2026-01-01 falls in ISO week 1 of 2026.
        let date: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(WeeklyGoal::week_key(date), "2026-W01");
    }
}
