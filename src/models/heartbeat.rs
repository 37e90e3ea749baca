// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Participant liveness records, independent of GPS cadence.
//!
//! A stationary runner still sending signal stays active; a runner who
//! vanishes past the threshold counts as inactive regardless of whether
//! they were tracking. Spectators (`is_tracking == false`) never block
//! tracking-completion checks.

use crate::models::route::GeoPoint;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-participant heartbeat stored in the session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantActivity {
    /// Timestamp of the last signal of any kind.
    pub last_update: DateTime<Utc>,
    /// Runner vs spectator flag.
    #[serde(default)]
    pub is_tracking: bool,
    #[serde(default)]
    pub last_location: Option<GeoPoint>,
    #[serde(default)]
    pub last_heart_rate: Option<u16>,
}

impl ParticipantActivity {
    /// New joiners are spectators until they start tracking.
    pub fn joined(now: DateTime<Utc>) -> Self {
        Self {
            last_update: now,
            is_tracking: false,
            last_location: None,
            last_heart_rate: None,
        }
    }

    /// Any signal refreshes the heartbeat.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_update = now;
    }

    pub fn start_tracking(&mut self, now: DateTime<Utc>) {
        self.is_tracking = true;
        self.touch(now);
    }

    pub fn stop_tracking(&mut self, now: DateTime<Utc>) {
        self.is_tracking = false;
        self.touch(now);
    }

    pub fn record_location(&mut self, location: GeoPoint, now: DateTime<Utc>) {
        self.last_location = Some(location);
        self.touch(now);
    }

    pub fn record_heart_rate(&mut self, bpm: u16, now: DateTime<Utc>) {
        self.last_heart_rate = Some(bpm);
        self.touch(now);
    }

    /// Strictly more than `threshold` since the last signal. A hard
    /// cutoff, no hysteresis.
    pub fn is_inactive(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_update > threshold
    }

    pub fn is_actively_tracking(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.is_tracking && !self.is_inactive(now, threshold)
    }
}

/// Count of participants currently tracking and alive.
pub fn active_tracker_count(
    activity: &HashMap<String, ParticipantActivity>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> usize {
    activity
        .values()
        .filter(|a| a.is_actively_tracking(now, threshold))
        .count()
}

/// Count of spectators (not tracking), alive or not.
pub fn spectator_count(activity: &HashMap<String, ParticipantActivity>) -> usize {
    activity.values().filter(|a| !a.is_tracking).count()
}

/// Ids of everyone past the inactivity threshold.
pub fn inactive_participant_ids(
    activity: &HashMap<String, ParticipantActivity>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Vec<String> {
    let mut ids: Vec<String> = activity
        .iter()
        .filter(|(_, a)| a.is_inactive(now, threshold))
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}

/// True when every tracking participant is inactive, or when there are no
/// tracking participants at all. Spectators never affect the result.
pub fn all_tracking_participants_inactive(
    activity: &HashMap<String, ParticipantActivity>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    activity
        .values()
        .filter(|a| a.is_tracking)
        .all(|a| a.is_inactive(now, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    fn threshold() -> Duration {
        Duration::seconds(60)
    }

    #[test]
    fn test_inactive_is_strict_cutoff() {
        let activity = ParticipantActivity::joined(t(0));
        assert!(!activity.is_inactive(t(60), threshold()));
        assert!(activity.is_inactive(t(61), threshold()));
    }

    #[test]
    fn test_inactive_independent_of_tracking_flag() {
        let mut runner = ParticipantActivity::joined(t(0));
        runner.start_tracking(t(0));
        let spectator = ParticipantActivity::joined(t(0));

        assert!(runner.is_inactive(t(120), threshold()));
        assert!(spectator.is_inactive(t(120), threshold()));
    }

    #[test]
    fn test_touch_resets_liveness() {
        let mut activity = ParticipantActivity::joined(t(0));
        activity.touch(t(100));
        assert!(!activity.is_inactive(t(150), threshold()));
    }

    #[test]
    fn test_location_and_biometric_signals_count_as_heartbeats() {
        let mut activity = ParticipantActivity::joined(t(0));

        activity.record_location(
            GeoPoint {
                latitude: 37.4,
                longitude: -122.1,
            },
            t(70),
        );
        assert!(!activity.is_inactive(t(100), threshold()));
        assert_eq!(activity.last_location.unwrap().latitude, 37.4);

        activity.record_heart_rate(152, t(140));
        assert!(!activity.is_inactive(t(190), threshold()));
        assert_eq!(activity.last_heart_rate, Some(152));
    }

    #[test]
    fn test_all_tracking_inactive_empty_map() {
        let activity: HashMap<String, ParticipantActivity> = HashMap::new();
        assert!(all_tracking_participants_inactive(&activity, t(0), threshold()));
    }

    #[test]
    fn test_all_tracking_inactive_only_spectators() {
        let mut activity = HashMap::new();
        activity.insert("spectator".to_string(), ParticipantActivity::joined(t(0)));
        // Zero tracking participants -> vacuously true, spectator liveness
        // is irrelevant.
        assert!(all_tracking_participants_inactive(&activity, t(10), threshold()));
        assert!(all_tracking_participants_inactive(&activity, t(500), threshold()));
    }

    #[test]
    fn test_one_live_tracker_blocks() {
        let mut activity = HashMap::new();

        let mut stale = ParticipantActivity::joined(t(0));
        stale.start_tracking(t(0));
        activity.insert("stale".to_string(), stale);

        let mut live = ParticipantActivity::joined(t(0));
        live.start_tracking(t(100));
        activity.insert("live".to_string(), live);

        assert!(!all_tracking_participants_inactive(&activity, t(120), threshold()));
        // Once the live one goes stale too, the check flips.
        assert!(all_tracking_participants_inactive(&activity, t(500), threshold()));
    }

    #[test]
    fn test_aggregate_counts() {
        let mut activity = HashMap::new();

        let mut runner = ParticipantActivity::joined(t(0));
        runner.start_tracking(t(90));
        activity.insert("runner".to_string(), runner);

        let mut stale_runner = ParticipantActivity::joined(t(0));
        stale_runner.start_tracking(t(0));
        activity.insert("stale_runner".to_string(), stale_runner);

        activity.insert("watcher".to_string(), ParticipantActivity::joined(t(95)));

        let now = t(100);
        assert_eq!(active_tracker_count(&activity, now, threshold()), 1);
        assert_eq!(spectator_count(&activity), 1);
        assert_eq!(
            inactive_participant_ids(&activity, now, threshold()),
            vec!["stale_runner".to_string()]
        );
    }
}
