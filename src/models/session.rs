// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Session document model and session-level status rules.
//!
//! Every field a legacy client may have omitted carries a serde default so
//! partial documents decode instead of failing (tolerant decoder). Status
//! transition *writes* go through the store's conditional update; the
//! pure rules (`can_be_ended`, aggregate queries) live here.

use crate::models::heartbeat::{self, ParticipantActivity};
use crate::models::participant::ParticipantSessionState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Session lifecycle status. Transitions only move forward except the
/// Active <-> Paused toggle; Ended is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    #[default]
    SquadOnly,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    #[default]
    Casual,
    Training,
    Race,
}

/// Aggregate stats for the whole session. Monotonically non-decreasing
/// while the session is active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub total_distance_meters: f64,
    #[serde(default)]
    pub total_duration_secs: f64,
    #[serde(default)]
    pub average_speed_mps: f64,
    #[serde(default)]
    pub max_speed_mps: f64,
}

impl SessionStats {
    /// Fold one participant's terminal tracking snapshot into the session
    /// aggregate.
    pub fn merge(&mut self, distance_meters: f64, duration_secs: f64, max_speed_mps: f64) {
        self.total_distance_meters += distance_meters.max(0.0);
        self.total_duration_secs += duration_secs.max(0.0);
        self.max_speed_mps = self.max_speed_mps.max(max_speed_mps.max(0.0));
        self.average_speed_mps = if self.total_duration_secs > 0.0 {
            self.total_distance_meters / self.total_duration_secs
        } else {
            0.0
        };
    }
}

/// Stored session document (`sessions/{id}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub squad_id: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    /// Ordered list with set semantics; the store's array-union keeps it
    /// duplicate-free.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_states: HashMap<String, ParticipantSessionState>,
    #[serde(default)]
    pub participant_activity: HashMap<String, ParticipantActivity>,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default)]
    pub target_distance_meters: Option<f64>,
    #[serde(default)]
    pub target_duration_secs: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub run_type: RunType,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default = "default_joinable")]
    pub joinable: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_joinable() -> bool {
    true
}

impl Session {
    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.max_participants
            .is_some_and(|max| self.participants.len() >= max as usize)
    }

    /// Completion policy: every participant state is terminal.
    ///
    /// A session with no participant states at all is a legacy document
    /// and is treated as always completable.
    pub fn can_be_ended(&self) -> bool {
        self.participant_states.values().all(|s| s.is_terminal())
    }

    /// Whether the heartbeat-based inactivity check applies. Legacy
    /// sessions without an activity map fall back to `can_be_ended`.
    pub fn has_activity_map(&self) -> bool {
        !self.participant_activity.is_empty()
    }

    pub fn all_tracking_participants_inactive(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> bool {
        heartbeat::all_tracking_participants_inactive(&self.participant_activity, now, threshold)
    }

    pub fn active_tracker_count(&self, now: DateTime<Utc>, threshold: Duration) -> usize {
        heartbeat::active_tracker_count(&self.participant_activity, now, threshold)
    }

    pub fn spectator_count(&self) -> usize {
        heartbeat::spectator_count(&self.participant_activity)
    }

    pub fn inactive_participant_ids(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<String> {
        heartbeat::inactive_participant_ids(&self.participant_activity, now, threshold)
    }

    /// Session duration stamped at end: (ended - started), floored at zero.
    pub fn duration_until(&self, ended_at: DateTime<Utc>) -> i64 {
        self.started_at
            .map(|started| (ended_at - started).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// Validated input for session creation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSessionInput {
    #[validate(length(min = 1))]
    pub squad_id: String,
    #[validate(length(min = 1, max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(range(min = 1.0))]
    pub target_distance_meters: Option<f64>,
    #[validate(range(min = 1))]
    pub target_duration_secs: Option<u64>,
    #[validate(range(min = 1, max = 500))]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub run_type: RunType,
    #[serde(default = "default_joinable")]
    pub joinable: bool,
}

impl CreateSessionInput {
    pub fn for_squad(squad_id: impl Into<String>) -> Self {
        Self {
            squad_id: squad_id.into(),
            title: None,
            notes: None,
            target_distance_meters: None,
            target_duration_secs: None,
            max_participants: None,
            visibility: Visibility::default(),
            run_type: RunType::default(),
            joinable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::participant::ParticipantStatus;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    fn state_with(status: ParticipantStatus) -> ParticipantSessionState {
        ParticipantSessionState {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_can_be_ended_requires_all_terminal() {
        let mut session = Session::default();
        session
            .participant_states
            .insert("a".into(), state_with(ParticipantStatus::Ended));
        session
            .participant_states
            .insert("b".into(), state_with(ParticipantStatus::Abandoned));
        assert!(session.can_be_ended());

        session
            .participant_states
            .insert("c".into(), state_with(ParticipantStatus::Paused));
        assert!(!session.can_be_ended());
    }

    #[test]
    fn test_legacy_session_always_completable() {
        let session = Session::default();
        assert!(session.participant_states.is_empty());
        assert!(session.can_be_ended());
        assert!(!session.has_activity_map());
    }

    #[test]
    fn test_duration_until_clamps() {
        let mut session = Session::default();
        assert_eq!(session.duration_until(t(100)), 0); // never started

        session.started_at = Some(t(100));
        assert_eq!(session.duration_until(t(400)), 300);
        assert_eq!(session.duration_until(t(50)), 0); // skewed writer
    }

    #[test]
    fn test_stats_merge_monotonic() {
        let mut stats = SessionStats::default();
        stats.merge(1000.0, 600.0, 4.2);
        stats.merge(500.0, 300.0, 3.0);

        assert_eq!(stats.total_distance_meters, 1500.0);
        assert_eq!(stats.total_duration_secs, 900.0);
        assert_eq!(stats.max_speed_mps, 4.2);
        assert!((stats.average_speed_mps - 1500.0 / 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_activity_aggregates_delegate() {
        let mut session = Session::default();
        let mut runner = ParticipantActivity::joined(t(0));
        runner.start_tracking(t(0));
        session.participant_activity.insert("runner".into(), runner);
        session
            .participant_activity
            .insert("watcher".into(), ParticipantActivity::joined(t(0)));

        let threshold = Duration::seconds(60);
        assert!(session.has_activity_map());
        assert_eq!(session.active_tracker_count(t(30), threshold), 1);
        assert_eq!(session.spectator_count(), 1);
        assert!(session.inactive_participant_ids(t(30), threshold).is_empty());

        // Runner silent past the threshold: check flips, spectator does
        // not hold it open.
        assert!(session.all_tracking_participants_inactive(t(120), threshold));
        assert_eq!(
            session.inactive_participant_ids(t(120), threshold),
            vec!["runner".to_string(), "watcher".to_string()]
        );
    }

    #[test]
    fn test_tolerant_decode_of_partial_document() {
        // A legacy document with only a handful of fields must decode.
        let session: Session = serde_json::from_value(serde_json::json!({
            "creator_id": "user1",
            "status": "active",
            "participants": ["user1"],
        }))
        .unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.joinable);
        assert!(session.participant_states.is_empty());
        assert_eq!(session.stats.total_distance_meters, 0.0);
    }

    #[test]
    fn test_create_input_validation() {
        let mut input = CreateSessionInput::for_squad("squad1");
        assert!(input.validate().is_ok());

        input.max_participants = Some(0);
        assert!(input.validate().is_err());

        input.max_participants = Some(10);
        input.target_distance_meters = Some(-5.0);
        assert!(input.validate().is_err());
    }
}
