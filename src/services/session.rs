// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle orchestration.
//!
//! The session document is a shared mutable resource across all
//! connected clients: mutations here are always field-level partial
//! updates, and status transitions go through the store's conditional
//! update so concurrent writers cannot regress the lifecycle. Writes
//! that downstream invariants depend on (participant terminal states,
//! the completion check) are awaited; cosmetic ones ride best-effort.

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::heartbeat::ParticipantActivity;
use crate::models::participant::ParticipantSessionState;
use crate::models::session::{CreateSessionInput, Session, SessionStatus};
use crate::services::progression::ProgressionService;
use crate::store::{
    collections, FieldUpdates, FieldValue, Filter, OrderBy, RemoteStore, SubscribeTarget,
    Subscription,
};
use crate::tasks::{with_timeout, BestEffortTasks};
use crate::time_utils::Clock;
use futures_util::{stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// Bound on concurrent force-end writes during the stale sweep.
const MAX_CONCURRENT_CLEANUPS: usize = 8;

pub struct SessionService {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: Config,
    progression: Arc<ProgressionService>,
    list_cache: ResponseCache<Vec<Session>>,
    best_effort: BestEffortTasks,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        config: Config,
        progression: Arc<ProgressionService>,
    ) -> Self {
        let list_cache = ResponseCache::new(config.list_cache_ttl());
        Self {
            store,
            clock,
            config,
            progression,
            list_cache,
            best_effort: BestEffortTasks::new(),
        }
    }

    // ─── Creation and membership ─────────────────────────────────

    /// Create a session in Scheduled state with the creator joined.
    pub async fn create_session(
        &self,
        input: CreateSessionInput,
        creator_id: &str,
    ) -> Result<Session> {
        input
            .validate()
            .map_err(|e| AppError::InvalidState(format!("invalid session input: {}", e)))?;

        let now = self.clock.now();
        let mut session = Session {
            id: self.store.generate_id(),
            squad_id: input.squad_id.clone(),
            creator_id: creator_id.to_string(),
            status: SessionStatus::Scheduled,
            participants: vec![creator_id.to_string()],
            target_distance_meters: input.target_distance_meters,
            target_duration_secs: input.target_duration_secs,
            title: input.title,
            notes: input.notes,
            visibility: input.visibility,
            run_type: input.run_type,
            max_participants: input.max_participants,
            joinable: input.joinable,
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        session
            .participant_states
            .insert(creator_id.to_string(), ParticipantSessionState::default());
        session
            .participant_activity
            .insert(creator_id.to_string(), ParticipantActivity::joined(now));

        self.store
            .set_document(
                collections::SESSIONS,
                &session.id,
                serde_json::to_value(&session)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize session: {}", e)))?,
                false,
            )
            .await?;

        // Squad active-session list is maintained atomically.
        let mut updates = FieldUpdates::new();
        updates.insert(
            "active_sessions".to_string(),
            FieldValue::ArrayUnion(vec![json!(session.id)]),
        );
        self.store
            .update_fields(collections::SQUADS, &session.squad_id, updates)
            .await?;

        self.list_cache.clear();
        tracing::info!(
            session_id = %session.id,
            squad_id = %session.squad_id,
            creator_id,
            "Session created"
        );
        Ok(session)
    }

    /// Join an existing session as a new participant (spectator until
    /// they start tracking).
    pub async fn join_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        let session = self.get_session(session_id).await?;

        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }
        if session.has_participant(user_id) {
            return Err(AppError::AlreadyJoined(user_id.to_string()));
        }
        if !session.joinable {
            return Err(AppError::InvalidState(format!(
                "session {} is not joinable",
                session_id
            )));
        }
        if session.is_full() {
            return Err(AppError::InvalidState(format!(
                "session {} is full",
                session_id
            )));
        }

        let now = self.clock.now();
        let mut updates = FieldUpdates::new();
        updates.insert(
            "participants".to_string(),
            FieldValue::ArrayUnion(vec![json!(user_id)]),
        );
        updates.insert(
            state_path(user_id),
            FieldValue::json(&ParticipantSessionState::default())?,
        );
        updates.insert(
            activity_path(user_id),
            FieldValue::json(&ParticipantActivity::joined(now))?,
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);

        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await?;

        self.list_cache.clear();
        tracing::info!(session_id, user_id, "Participant joined");
        Ok(())
    }

    // ─── Participant transitions ─────────────────────────────────

    /// Waiting -> Active for the participant. The first start also flips
    /// the session itself to Active via a guarded update, so concurrent
    /// first-starters cannot double-stamp the session start time.
    pub async fn start_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        let session = self.get_session(session_id).await?;
        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }
        let mut state = self.participant_state(&session, user_id)?;

        let now = self.clock.now();
        if !state.start(now) {
            // Guarded transition: not in Waiting is a no-op, not an error.
            return Ok(());
        }

        let mut updates = FieldUpdates::new();
        updates.insert(state_path(user_id), FieldValue::json(&state)?);
        updates.insert(
            format!("{}.is_tracking", activity_path(user_id)),
            FieldValue::Json(json!(true)),
        );
        updates.insert(
            format!("{}.last_update", activity_path(user_id)),
            FieldValue::ServerTimestamp,
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await?;

        // Only set Active if still Scheduled; losers of the race no-op.
        let mut activation = FieldUpdates::new();
        activation.insert("status".to_string(), FieldValue::Json(json!("active")));
        activation.insert("started_at".to_string(), FieldValue::ServerTimestamp);
        activation.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        let activated = self
            .store
            .conditional_update(
                collections::SESSIONS,
                session_id,
                "status",
                json!("scheduled"),
                activation,
            )
            .await?;
        if activated {
            tracing::info!(session_id, user_id, "Session activated by first start");
        }

        self.list_cache.clear();
        Ok(())
    }

    /// Active -> Paused for the participant.
    pub async fn pause_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.transition_participant(session_id, user_id, |state, now| state.pause(now))
            .await
    }

    /// Paused -> Active for the participant.
    pub async fn resume_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.transition_participant(session_id, user_id, |state, now| state.resume(now))
            .await
    }

    /// Active|Paused -> Ended, then run the completion check.
    pub async fn finish_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.terminate_participant(session_id, user_id, |state, now| state.finish(now))
            .await
    }

    /// Active|Paused -> Abandoned, then run the completion check.
    pub async fn abandon_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.terminate_participant(session_id, user_id, |state, now| state.abandon(now))
            .await
    }

    async fn transition_participant<F>(
        &self,
        session_id: &str,
        user_id: &str,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ParticipantSessionState, chrono::DateTime<chrono::Utc>) -> bool,
    {
        let session = self.get_session(session_id).await?;
        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }
        let mut state = self.participant_state(&session, user_id)?;

        if !apply(&mut state, self.clock.now()) {
            return Ok(());
        }

        let mut updates = FieldUpdates::new();
        updates.insert(state_path(user_id), FieldValue::json(&state)?);
        updates.insert(
            format!("{}.last_update", activity_path(user_id)),
            FieldValue::ServerTimestamp,
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await
    }

    async fn terminate_participant<F>(
        &self,
        session_id: &str,
        user_id: &str,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ParticipantSessionState, chrono::DateTime<chrono::Utc>) -> bool,
    {
        let session = self.get_session(session_id).await?;
        let mut state = self.participant_state(&session, user_id)?;

        if state.is_terminal() {
            // finish/abandon are idempotent once terminal.
            return Ok(());
        }
        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }

        if !apply(&mut state, self.clock.now()) {
            return Ok(());
        }

        // Awaited: the completion check below depends on this landing.
        let mut updates = FieldUpdates::new();
        updates.insert(state_path(user_id), FieldValue::json(&state)?);
        updates.insert(
            format!("{}.is_tracking", activity_path(user_id)),
            FieldValue::Json(json!(false)),
        );
        updates.insert(
            format!("{}.last_update", activity_path(user_id)),
            FieldValue::ServerTimestamp,
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await?;

        self.check_and_complete(session_id).await?;
        Ok(())
    }

    // ─── Session-level transitions ───────────────────────────────

    /// Automatic completion policy: end the session iff every
    /// participant state is terminal. Returns whether the session ended.
    pub async fn check_and_complete(&self, session_id: &str) -> Result<bool> {
        let session = self.get_session(session_id).await?;
        if session.is_ended() {
            return Ok(false);
        }
        if !session.can_be_ended() {
            return Ok(false);
        }
        self.end_session_guarded(&session).await
    }

    /// Creator-only "end for everyone": always permitted, immediate,
    /// irreversible.
    pub async fn end_for_everyone(&self, session_id: &str, caller_id: &str) -> Result<()> {
        let session = self.get_session(session_id).await?;
        if !session.is_creator(caller_id) {
            return Err(AppError::NotAuthorized(format!(
                "only the creator can end session {}",
                session_id
            )));
        }
        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }

        let now = self.clock.now();
        let mut updates = FieldUpdates::new();
        updates.insert("status".to_string(), FieldValue::Json(json!("ended")));
        updates.insert("ended_at".to_string(), FieldValue::ServerTimestamp);
        updates.insert(
            "duration_seconds".to_string(),
            FieldValue::Json(json!(session.duration_until(now))),
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await?;

        tracing::info!(session_id, caller_id, "Session ended for everyone");
        self.after_session_end(&session).await;
        Ok(())
    }

    /// Creator-only Active -> Paused toggle. Returns whether it applied.
    pub async fn pause_session(&self, session_id: &str, caller_id: &str) -> Result<bool> {
        self.toggle_session_status(session_id, caller_id, "active", "paused")
            .await
    }

    /// Creator-only Paused -> Active toggle. Returns whether it applied.
    pub async fn resume_session(&self, session_id: &str, caller_id: &str) -> Result<bool> {
        self.toggle_session_status(session_id, caller_id, "paused", "active")
            .await
    }

    async fn toggle_session_status(
        &self,
        session_id: &str,
        caller_id: &str,
        from: &str,
        to: &str,
    ) -> Result<bool> {
        let session = self.get_session(session_id).await?;
        if !session.is_creator(caller_id) {
            return Err(AppError::NotAuthorized(format!(
                "only the creator can pause/resume session {}",
                session_id
            )));
        }
        if session.is_ended() {
            return Err(AppError::AlreadyEnded(session_id.to_string()));
        }

        let mut updates = FieldUpdates::new();
        updates.insert("status".to_string(), FieldValue::Json(json!(to)));
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        let applied = self
            .store
            .conditional_update(collections::SESSIONS, session_id, "status", json!(from), updates)
            .await?;

        if applied {
            self.list_cache.clear();
        }
        Ok(applied)
    }

    /// Administrative force-end. Works even when the document does not
    /// decode: the status still flips to Ended and the duration is
    /// stamped from whatever start time is readable.
    pub async fn force_end_session(&self, session_id: &str) -> Result<()> {
        let snapshot = self
            .store
            .get_document(collections::SESSIONS, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        let now = self.clock.now();
        let started_at: Option<chrono::DateTime<chrono::Utc>> = snapshot
            .fields
            .get("started_at")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        let duration = started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0);

        let mut updates = FieldUpdates::new();
        updates.insert("status".to_string(), FieldValue::Json(json!("ended")));
        updates.insert("ended_at".to_string(), FieldValue::ServerTimestamp);
        updates.insert("duration_seconds".to_string(), FieldValue::Json(json!(duration)));
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);
        self.store
            .update_fields(collections::SESSIONS, session_id, updates)
            .await?;

        // Post-end bookkeeping only for documents we can still read.
        if let Ok(session) = snapshot.decode::<Session>() {
            self.after_session_end(&session).await;
        } else {
            self.list_cache.clear();
        }

        tracing::warn!(session_id, "Session force-ended");
        Ok(())
    }

    /// Bulk cleanup: force-end every active session whose trackers have
    /// all been inactive past threshold + grace. Undecodable active
    /// sessions count as stuck and are force-ended too. Returns how many
    /// sessions were ended.
    pub async fn force_end_stale_sessions(&self) -> Result<usize> {
        let snapshots = self
            .store
            .run_query(
                collections::SESSIONS,
                &[Filter::eq("status", "active")],
                None,
                None,
            )
            .await?;

        let now = self.clock.now();
        let stale_threshold = self.config.inactivity_threshold()
            + chrono::Duration::seconds(self.config.stale_session_grace_secs as i64);

        let stale_ids: Vec<String> = snapshots
            .into_iter()
            .filter(|snapshot| match snapshot.decode::<Session>() {
                Ok(session) => {
                    if session.has_activity_map() {
                        session.all_tracking_participants_inactive(now, stale_threshold)
                    } else {
                        // Legacy sessions: fall back to the state machine check.
                        session.can_be_ended()
                    }
                }
                Err(err) => {
                    tracing::warn!(id = %snapshot.id, error = %err, "Undecodable active session, treating as stuck");
                    true
                }
            })
            .map(|snapshot| snapshot.id)
            .collect();

        let ended = stale_ids.len();
        stream::iter(stale_ids)
            .map(|id| async move { self.force_end_session(&id).await })
            .buffer_unordered(MAX_CONCURRENT_CLEANUPS)
            .collect::<Vec<Result<()>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        if ended > 0 {
            tracing::info!(ended, "Stale session sweep complete");
        }
        Ok(ended)
    }

    async fn end_session_guarded(&self, session: &Session) -> Result<bool> {
        let now = self.clock.now();
        let mut updates = FieldUpdates::new();
        updates.insert("status".to_string(), FieldValue::Json(json!("ended")));
        updates.insert("ended_at".to_string(), FieldValue::ServerTimestamp);
        updates.insert(
            "duration_seconds".to_string(),
            FieldValue::Json(json!(session.duration_until(now))),
        );
        updates.insert("updated_at".to_string(), FieldValue::ServerTimestamp);

        // The session may be Active, Paused, or (legacy, never started)
        // still Scheduled; only one guarded attempt can win.
        for expected in ["active", "paused", "scheduled"] {
            let applied = self
                .store
                .conditional_update(
                    collections::SESSIONS,
                    &session.id,
                    "status",
                    json!(expected),
                    updates.clone(),
                )
                .await?;
            if applied {
                tracing::info!(session_id = %session.id, "Session completed automatically");
                self.after_session_end(session).await;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Post-end bookkeeping: squad active-session removal (awaited, the
    /// squad list must not keep dangling ids) and per-participant
    /// progression recompute (best-effort).
    async fn after_session_end(&self, session: &Session) {
        self.list_cache.clear();

        if !session.squad_id.is_empty() {
            let mut updates = FieldUpdates::new();
            updates.insert(
                "active_sessions".to_string(),
                FieldValue::ArrayRemove(vec![json!(session.id)]),
            );
            if let Err(err) = self
                .store
                .update_fields(collections::SQUADS, &session.squad_id, updates)
                .await
            {
                tracing::warn!(
                    session_id = %session.id,
                    squad_id = %session.squad_id,
                    error = %err,
                    "Failed to remove session from squad active list"
                );
            }
        }

        for user_id in session.participants.clone() {
            let progression = Arc::clone(&self.progression);
            let session_id = session.id.clone();
            self.best_effort
                .spawn("progression_recompute", async move {
                    progression
                        .recompute_after_session(&user_id, &session_id)
                        .await
                        .map(|_| ())
                        .map_err(|e| AppError::Internal(anyhow::anyhow!("progression: {}", e)))
                })
                .await;
        }
    }

    // ─── Reads and subscriptions ─────────────────────────────────

    /// Load a session or fail with a typed NotFound.
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        let snapshot = with_timeout(
            self.config.remote_timeout(),
            "get_session",
            self.store.get_document(collections::SESSIONS, session_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        // A required document that does not decode is a real error, not
        // a skippable item.
        snapshot.decode()
    }

    /// Sessions of a squad, newest first. Short-TTL cached; corrupt
    /// documents are logged and skipped so one bad record never fails
    /// the listing.
    pub async fn sessions_for_squad(&self, squad_id: &str) -> Result<Vec<Session>> {
        let cache_key = format!("squad_sessions:{}", squad_id);
        if let Some(cached) = self.list_cache.get(&cache_key) {
            return Ok(cached);
        }

        let snapshots = self
            .store
            .run_query(
                collections::SESSIONS,
                &[Filter::eq("squad_id", squad_id)],
                Some(OrderBy::desc("created_at")),
                None,
            )
            .await?;

        let mut sessions = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            match snapshot.decode::<Session>() {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    tracing::warn!(id = %snapshot.id, error = %err, "Skipping undecodable session");
                }
            }
        }

        self.list_cache.insert(cache_key, sessions.clone());
        Ok(sessions)
    }

    /// Observe a session document. Each event is the latest decoded
    /// state (`None` once the document is deleted); undecodable
    /// intermediate snapshots are skipped.
    pub async fn subscribe_session(&self, session_id: &str) -> Result<SessionSubscription> {
        let inner = self
            .store
            .subscribe(SubscribeTarget::Document {
                collection: collections::SESSIONS.to_string(),
                id: session_id.to_string(),
            })
            .await?;
        Ok(SessionSubscription { inner })
    }

    /// Force-await pending best-effort tasks (test hook).
    pub async fn drain_background_writes(&self) {
        self.best_effort.drain().await;
    }

    fn participant_state(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<ParticipantSessionState> {
        session
            .participant_states
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "user {} is not a participant of session {}",
                    user_id, session.id
                ))
            })
    }
}

/// Cancelable stream of decoded session snapshots.
pub struct SessionSubscription {
    inner: Subscription,
}

impl SessionSubscription {
    /// Next state change: `Some(Some(session))` on updates,
    /// `Some(None)` when the document disappears, `None` once canceled.
    pub async fn next(&mut self) -> Option<Option<Session>> {
        loop {
            let snapshots = self.inner.next().await?;
            let Some(snapshot) = snapshots.first() else {
                return Some(None);
            };
            match snapshot.decode::<Session>() {
                Ok(session) => return Some(Some(session)),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping undecodable session snapshot");
                }
            }
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

fn state_path(user_id: &str) -> String {
    format!("participant_states.{}", user_id)
}

fn activity_path(user_id: &str) -> String {
    format!("participant_activity.{}", user_id)
}
