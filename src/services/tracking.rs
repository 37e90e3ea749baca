// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking aggregator: converts the GPS sample stream into running
//! statistics and a local point buffer, and mediates between frequent
//! local computation and infrequent batched remote writes.
//!
//! All in-memory tracking state sits behind one mutex and is only
//! touched by sample processing and the cadence tasks; the lock is never
//! held across an await. Three cadences run while tracking: the legacy
//! point-buffer flush, the realtime position ping, and the v2 route
//! autosave. All are canceled on stop.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::geo_utils::haversine_distance;
use crate::models::route::RoutePoint;
use crate::models::session::Session;
use crate::services::geo_source::{GeoSample, GeoSourceEvent};
use crate::services::route_history::RouteHistoryService;
use crate::store::{collections, FieldUpdates, FieldValue, RemoteStore};
use crate::tasks::{spawn_periodic, BestEffortTasks};
use crate::time_utils::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Running statistics for the active tracking run. Local and ephemeral;
/// only the terminal snapshot is persisted.
#[derive(Debug, Clone, Default)]
pub struct TrackingStats {
    pub points_count: u32,
    pub total_distance_meters: f64,
    pub duration_secs: f64,
    pub current_speed_mps: f64,
    pub average_speed_mps: f64,
    pub max_speed_mps: f64,
    pub is_paused: bool,
    pub total_pause_secs: f64,
}

/// Terminal snapshot returned by `stop` and persisted to
/// `sessions/{id}/participantStats/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSummary {
    pub session_id: String,
    pub user_id: String,
    pub points_count: u32,
    pub total_distance_meters: f64,
    pub duration_secs: f64,
    pub average_speed_mps: f64,
    pub max_speed_mps: f64,
    pub ended_at: DateTime<Utc>,
}

struct ActiveTracking {
    session_id: String,
    user_id: String,
    started_at: DateTime<Utc>,
    stats: TrackingStats,
    pause_started_at: Option<DateTime<Utc>>,
    last_point: Option<RoutePoint>,
    buffer: VecDeque<RoutePoint>,
    route: Vec<RoutePoint>,
    cancel: CancellationToken,
}

impl ActiveTracking {
    fn flush_pending_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.pause_started_at.take() {
            let pause = (now - paused_at).num_milliseconds().max(0) as f64 / 1000.0;
            self.stats.total_pause_secs += pause;
        }
    }

    /// Duration excludes accumulated (and pending) pause time.
    fn refresh_duration(&mut self, now: DateTime<Utc>) {
        let mut elapsed = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        elapsed -= self.stats.total_pause_secs;
        if let Some(paused_at) = self.pause_started_at {
            elapsed -= (now - paused_at).num_milliseconds().max(0) as f64 / 1000.0;
        }
        self.stats.duration_secs = elapsed.max(0.0);
    }
}

/// Aggregates GPS samples for one tracking run at a time.
pub struct TrackingAggregator {
    store: Arc<dyn RemoteStore>,
    routes: Arc<RouteHistoryService>,
    clock: Arc<dyn Clock>,
    config: Config,
    state: Mutex<Option<ActiveTracking>>,
    best_effort: BestEffortTasks,
}

impl TrackingAggregator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        routes: Arc<RouteHistoryService>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            store,
            routes,
            clock,
            config,
            state: Mutex::new(None),
            best_effort: BestEffortTasks::new(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Current stats snapshot, if a run is active.
    pub fn stats(&self) -> Option<TrackingStats> {
        self.state.lock().unwrap().as_ref().map(|a| a.stats.clone())
    }

    /// Begin a tracking run. Fails if one is already in progress for
    /// this actor, regardless of session (double-tracking guard).
    pub fn start(self: &Arc<Self>, session_id: &str, user_id: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let mut guard = self.state.lock().unwrap();
            if let Some(active) = guard.as_ref() {
                return Err(AppError::InvalidState(format!(
                    "tracking already in progress for session {}",
                    active.session_id
                )));
            }
            *guard = Some(ActiveTracking {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                started_at: self.clock.now(),
                stats: TrackingStats::default(),
                pause_started_at: None,
                last_point: None,
                buffer: VecDeque::new(),
                route: Vec::new(),
                cancel: cancel.clone(),
            });
        }

        self.spawn_cadences(cancel);
        tracing::info!(session_id, user_id, "Tracking started");
        Ok(())
    }

    fn spawn_cadences(self: &Arc<Self>, cancel: CancellationToken) {
        let flush = Arc::clone(self);
        spawn_periodic(
            "buffer_flush",
            self.config.effective_flush_interval(),
            cancel.clone(),
            move || {
                let flush = Arc::clone(&flush);
                async move {
                    if let Err(err) = flush.flush_once().await {
                        tracing::warn!(error = %err, "Buffer flush failed");
                    }
                }
            },
        );

        let ping = Arc::clone(self);
        spawn_periodic(
            "position_ping",
            self.config.position_ping_interval(),
            cancel.clone(),
            move || {
                let ping = Arc::clone(&ping);
                async move {
                    if let Err(err) = ping.ping_position_once().await {
                        tracing::warn!(error = %err, "Position ping failed");
                    }
                }
            },
        );

        let autosave = Arc::clone(self);
        spawn_periodic(
            "route_autosave",
            self.config.route_autosave_interval(),
            cancel,
            move || {
                let autosave = Arc::clone(&autosave);
                async move {
                    if let Err(err) = autosave.autosave_once().await {
                        tracing::warn!(error = %err, "Route autosave failed");
                    }
                }
            },
        );
    }

    /// Feed one source event through the aggregator.
    pub async fn handle_event(&self, event: GeoSourceEvent) -> Result<()> {
        match event {
            GeoSourceEvent::Sample(sample) => {
                self.record_sample(sample).await?;
                Ok(())
            }
            GeoSourceEvent::AuthorizationRevoked => {
                if self.is_tracking() {
                    tracing::warn!("Authorization revoked mid-run, forcing tracking stop");
                    self.stop().await?;
                }
                Ok(())
            }
        }
    }

    /// Process one GPS sample. Returns whether it was accepted into the
    /// stats and buffer.
    pub async fn record_sample(&self, sample: GeoSample) -> Result<bool> {
        let now = self.clock.now();

        let heartbeat = {
            let mut guard = self.state.lock().unwrap();
            let Some(active) = guard.as_mut() else {
                return Err(AppError::InvalidState(
                    "no tracking in progress".to_string(),
                ));
            };

            if active.stats.is_paused {
                return Ok(false);
            }
            if sample.horizontal_accuracy_m > self.config.accuracy_ceiling_m {
                tracing::debug!(
                    accuracy_m = sample.horizontal_accuracy_m,
                    "Rejected low-accuracy sample"
                );
                return Ok(false);
            }

            let point = sample.route_point();
            let mut delta_m = 0.0;
            if let Some(last) = &active.last_point {
                delta_m = haversine_distance(
                    last.latitude,
                    last.longitude,
                    point.latitude,
                    point.longitude,
                );
                if delta_m < self.config.effective_min_displacement_m() {
                    return Ok(false);
                }
                if delta_m <= self.config.distance_outlier_m {
                    active.stats.total_distance_meters += delta_m;
                } else {
                    // GPS glitch: keep the fix, never the jump distance.
                    tracing::debug!(delta_m, "Discarded outlier distance step");
                }
            }

            let speed = sample
                .speed_mps
                .or_else(|| {
                    active.last_point.as_ref().and_then(|last| {
                        let dt =
                            (point.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
                        (dt > 0.0).then(|| delta_m / dt)
                    })
                })
                .unwrap_or(0.0)
                .max(0.0);

            active.stats.current_speed_mps = speed;
            active.stats.max_speed_mps = active.stats.max_speed_mps.max(speed);
            active.stats.points_count += 1;
            active.refresh_duration(now);
            active.stats.average_speed_mps = if active.stats.duration_secs > 0.0 {
                active.stats.total_distance_meters / active.stats.duration_secs
            } else {
                0.0
            };

            active.buffer.push_back(point.clone());
            active.route.push(point.clone());
            active.last_point = Some(point);

            (active.session_id.clone(), active.user_id.clone(), sample.geo_point())
        };

        // Heartbeat touch rides along with every accepted sample.
        let (session_id, user_id, location) = heartbeat;
        let store = Arc::clone(&self.store);
        self.best_effort
            .spawn("sample_heartbeat", async move {
                let prefix = format!("participant_activity.{}", user_id);
                let mut updates = FieldUpdates::new();
                updates.insert(format!("{}.last_update", prefix), FieldValue::ServerTimestamp);
                updates.insert(format!("{}.is_tracking", prefix), FieldValue::Json(serde_json::json!(true)));
                updates.insert(
                    format!("{}.last_location", prefix),
                    FieldValue::json(&location)?,
                );
                store
                    .update_fields(collections::SESSIONS, &session_id, updates)
                    .await
            })
            .await;

        Ok(true)
    }

    /// Pause sample intake. Duration stops accumulating.
    pub fn pause(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let Some(active) = guard.as_mut() else {
            return Err(AppError::InvalidState("no tracking in progress".to_string()));
        };
        if !active.stats.is_paused {
            active.stats.is_paused = true;
            active.pause_started_at = Some(self.clock.now());
        }
        Ok(())
    }

    /// Resume sample intake, folding the pause interval into the total.
    pub fn resume(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let Some(active) = guard.as_mut() else {
            return Err(AppError::InvalidState("no tracking in progress".to_string()));
        };
        if active.stats.is_paused {
            let now = self.clock.now();
            active.flush_pending_pause(now);
            active.stats.is_paused = false;
            active.refresh_duration(now);
        }
        Ok(())
    }

    /// Flush up to `max_flush_batch` buffered points to the legacy
    /// per-point schema. A failed batch goes back to the buffer front.
    pub async fn flush_once(&self) -> Result<usize> {
        let (session_id, user_id, chunk) = {
            let mut guard = self.state.lock().unwrap();
            let Some(active) = guard.as_mut() else {
                return Ok(0);
            };
            if active.buffer.is_empty() {
                return Ok(0);
            }
            let n = active.buffer.len().min(self.config.max_flush_batch);
            let chunk: Vec<RoutePoint> = active.buffer.drain(..n).collect();
            (active.session_id.clone(), active.user_id.clone(), chunk)
        };

        let flushed = chunk.len();
        match self
            .routes
            .append_legacy_points(&session_id, &user_id, &chunk)
            .await
        {
            Ok(()) => {
                tracing::debug!(session_id, flushed, "Flushed point buffer");
                Ok(flushed)
            }
            Err(err) => {
                let mut guard = self.state.lock().unwrap();
                if let Some(active) = guard.as_mut() {
                    for point in chunk.into_iter().rev() {
                        active.buffer.push_front(point);
                    }
                }
                Err(err)
            }
        }
    }

    /// Write the current position for map display.
    pub async fn ping_position_once(&self) -> Result<()> {
        let payload = {
            let guard = self.state.lock().unwrap();
            guard.as_ref().and_then(|active| {
                active
                    .last_point
                    .as_ref()
                    .map(|p| (active.session_id.clone(), active.user_id.clone(), p.geo_point()))
            })
        };
        let Some((session_id, user_id, position)) = payload else {
            return Ok(());
        };

        let mut updates = FieldUpdates::new();
        updates.insert("position".to_string(), FieldValue::json(&position)?);
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(&collections::locations(&session_id), &user_id, updates)
            .await
    }

    /// Persist the full route so far as the v2 document.
    pub async fn autosave_once(&self) -> Result<()> {
        let payload = {
            let guard = self.state.lock().unwrap();
            guard.as_ref().map(|active| {
                (
                    active.session_id.clone(),
                    active.user_id.clone(),
                    active.route.clone(),
                )
            })
        };
        let Some((session_id, user_id, route)) = payload else {
            return Ok(());
        };
        if route.is_empty() {
            return Ok(());
        }
        self.routes.save_route(&session_id, &user_id, &route).await
    }

    /// End the run: cancel cadences, drain the buffer, persist the final
    /// route and stats snapshot, and return the summary.
    pub async fn stop(&self) -> Result<TrackingSummary> {
        let mut active = {
            let mut guard = self.state.lock().unwrap();
            guard.take().ok_or_else(|| {
                AppError::InvalidState("no tracking in progress".to_string())
            })?
        };
        active.cancel.cancel();

        let now = self.clock.now();
        active.flush_pending_pause(now);
        active.refresh_duration(now);

        // Drain whatever the periodic flush did not get to.
        while !active.buffer.is_empty() {
            let n = active.buffer.len().min(self.config.max_flush_batch);
            let chunk: Vec<RoutePoint> = active.buffer.drain(..n).collect();
            self.routes
                .append_legacy_points(&active.session_id, &active.user_id, &chunk)
                .await?;
        }

        if !active.route.is_empty() {
            self.routes
                .save_route(&active.session_id, &active.user_id, &active.route)
                .await?;
        }

        let summary = TrackingSummary {
            session_id: active.session_id.clone(),
            user_id: active.user_id.clone(),
            points_count: active.stats.points_count,
            total_distance_meters: active.stats.total_distance_meters,
            duration_secs: active.stats.duration_secs,
            average_speed_mps: if active.stats.duration_secs > 0.0 {
                active.stats.total_distance_meters / active.stats.duration_secs
            } else {
                0.0
            },
            max_speed_mps: active.stats.max_speed_mps,
            ended_at: now,
        };

        self.store
            .set_document(
                &collections::participant_stats(&active.session_id),
                &active.user_id,
                serde_json::to_value(&summary)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize summary: {}", e)))?,
                false,
            )
            .await?;

        // Fold the terminal snapshot into the session-level aggregate.
        // Transient stats tolerate last-writer-wins, so this rides
        // best-effort.
        let store = Arc::clone(&self.store);
        let merged = summary.clone();
        self.best_effort
            .spawn("session_stats_merge", async move {
                let Some(snapshot) = store
                    .get_document(collections::SESSIONS, &merged.session_id)
                    .await?
                else {
                    return Ok(());
                };
                let mut session: Session = match snapshot.decode() {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::warn!(error = %err, "Skipping stats merge on undecodable session");
                        return Ok(());
                    }
                };
                session.stats.merge(
                    merged.total_distance_meters,
                    merged.duration_secs,
                    merged.max_speed_mps,
                );
                let mut updates = FieldUpdates::new();
                updates.insert("stats".to_string(), FieldValue::json(&session.stats)?);
                updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
                store
                    .update_fields(collections::SESSIONS, &merged.session_id, updates)
                    .await
            })
            .await;

        tracing::info!(
            session_id = %summary.session_id,
            user_id = %summary.user_id,
            distance_m = summary.total_distance_meters,
            duration_s = summary.duration_secs,
            points = summary.points_count,
            "Tracking stopped"
        );
        Ok(summary)
    }

    /// Force-await pending best-effort writes (test hook).
    pub async fn drain_background_writes(&self) {
        self.best_effort.drain().await;
    }
}
