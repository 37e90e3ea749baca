// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-participant session state machine.
//!
//! Transitions are guarded: calling an operation whose precondition does
//! not hold is a silent no-op (the method returns `false`), not an error.
//! `Ended` and `Abandoned` are terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Participant progress status within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    Waiting,
    Active,
    Paused,
    Ended,
    Abandoned,
}

/// Stored per-participant state inside the session document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantSessionState {
    #[serde(default)]
    pub status: ParticipantStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated pause time in seconds. Only ever increases.
    #[serde(default)]
    pub paused_duration_secs: f64,
    /// Set iff status == Paused.
    #[serde(default)]
    pub last_paused_at: Option<DateTime<Utc>>,
}

impl ParticipantSessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Ended | ParticipantStatus::Abandoned
        )
    }

    /// Waiting -> Active. Stamps `started_at`.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ParticipantStatus::Waiting {
            return false;
        }
        self.status = ParticipantStatus::Active;
        self.started_at = Some(now);
        true
    }

    /// Active -> Paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ParticipantStatus::Active {
            return false;
        }
        self.status = ParticipantStatus::Paused;
        self.last_paused_at = Some(now);
        true
    }

    /// Paused -> Active. Accumulates the pause interval.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ParticipantStatus::Paused {
            return false;
        }
        self.flush_pending_pause(now);
        self.status = ParticipantStatus::Active;
        true
    }

    /// Active|Paused -> Ended. Idempotent once terminal.
    pub fn finish(&mut self, now: DateTime<Utc>) -> bool {
        self.terminate(ParticipantStatus::Ended, now)
    }

    /// Active|Paused -> Abandoned. Idempotent once terminal.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        self.terminate(ParticipantStatus::Abandoned, now)
    }

    fn terminate(&mut self, terminal: ParticipantStatus, now: DateTime<Utc>) -> bool {
        match self.status {
            ParticipantStatus::Active | ParticipantStatus::Paused => {
                // Flush any pending pause interval before going terminal so
                // a second call cannot double-count it.
                self.flush_pending_pause(now);
                self.status = terminal;
                self.ended_at = Some(now);
                true
            }
            _ => false,
        }
    }

    fn flush_pending_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.last_paused_at.take() {
            let pause = (now - paused_at).num_milliseconds().max(0) as f64 / 1000.0;
            self.paused_duration_secs += pause;
        }
    }

    /// Time actively spent: (endedAt or now) - startedAt - pausedDuration,
    /// clamped at zero. A still-paused participant's pending pause interval
    /// counts too.
    pub fn active_duration(&self, now: DateTime<Utc>) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::zero();
        };
        let end = self.ended_at.unwrap_or(now);
        let mut paused_ms = (self.paused_duration_secs * 1000.0) as i64;
        if let Some(paused_at) = self.last_paused_at {
            paused_ms += (end - paused_at).num_milliseconds().max(0);
        }
        let active = (end - started_at) - Duration::milliseconds(paused_ms);
        active.max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_start_only_from_waiting() {
        let mut state = ParticipantSessionState::default();
        assert!(state.start(t(0)));
        assert_eq!(state.status, ParticipantStatus::Active);
        assert_eq!(state.started_at, Some(t(0)));

        // Second start is a no-op.
        assert!(!state.start(t(10)));
        assert_eq!(state.started_at, Some(t(0)));
    }

    #[test]
    fn test_pause_resume_accumulates_duration() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));

        assert!(state.pause(t(100)));
        assert_eq!(state.last_paused_at, Some(t(100)));

        assert!(state.resume(t(130)));
        assert_eq!(state.status, ParticipantStatus::Active);
        assert_eq!(state.last_paused_at, None);
        assert!((state.paused_duration_secs - 30.0).abs() < 1e-9);

        // pausedDuration only increases.
        state.pause(t(200));
        state.resume(t(210));
        assert!((state.paused_duration_secs - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_resume_requires_paused() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));
        assert!(!state.resume(t(5)));
        assert_eq!(state.paused_duration_secs, 0.0);
    }

    #[test]
    fn test_finish_flushes_pending_pause_and_is_idempotent() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));
        state.pause(t(60));

        assert!(state.finish(t(90)));
        assert_eq!(state.status, ParticipantStatus::Ended);
        assert_eq!(state.ended_at, Some(t(90)));
        assert!((state.paused_duration_secs - 30.0).abs() < 1e-9);

        // Calling again must not double-count the pause or move ended_at.
        assert!(!state.finish(t(200)));
        assert!(!state.abandon(t(200)));
        assert_eq!(state.ended_at, Some(t(90)));
        assert!((state.paused_duration_secs - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_abandon_from_paused() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));
        state.pause(t(10));
        assert!(state.abandon(t(40)));
        assert_eq!(state.status, ParticipantStatus::Abandoned);
        assert!((state.paused_duration_secs - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_from_waiting_is_noop() {
        let mut state = ParticipantSessionState::default();
        assert!(!state.finish(t(0)));
        assert_eq!(state.status, ParticipantStatus::Waiting);
    }

    #[test]
    fn test_active_duration_property() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));
        state.pause(t(100));
        state.resume(t(160));
        state.finish(t(300));

        // (300 - 0) - 60 = 240
        assert_eq!(state.active_duration(t(999)).num_seconds(), 240);
    }

    #[test]
    fn test_active_duration_counts_pending_pause() {
        let mut state = ParticipantSessionState::default();
        state.start(t(0));
        state.pause(t(100));

        // Still paused at t=150: 100 active + 50 pending pause.
        assert_eq!(state.active_duration(t(150)).num_seconds(), 100);
    }

    #[test]
    fn test_active_duration_never_negative() {
        let state = ParticipantSessionState {
            status: ParticipantStatus::Ended,
            started_at: Some(t(100)),
            ended_at: Some(t(50)), // corrupt ordering from a skewed writer
            paused_duration_secs: 0.0,
            last_paused_at: None,
        };
        assert_eq!(state.active_duration(t(0)).num_seconds(), 0);
    }
}
