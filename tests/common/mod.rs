// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Utc};
use squadrun_core::config::Config;
use squadrun_core::models::WeeklyGoal;
use squadrun_core::services::{
    ProgressionService, RouteHistoryService, SessionService, TrackingAggregator,
};
use squadrun_core::store::{collections, MemoryStore, RemoteStore};
use squadrun_core::time_utils::{Clock, ManualClock};
use std::sync::Arc;

/// Fixed start instant for deterministic tests.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    "2026-08-01T08:00:00Z".parse().unwrap()
}

/// Everything a test needs, wired against the in-memory store.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
    pub sessions: SessionService,
    pub routes: Arc<RouteHistoryService>,
    pub progression: Arc<ProgressionService>,
}

#[allow(dead_code)]
pub fn harness() -> TestHarness {
    harness_with_config(Config::default())
}

#[allow(dead_code)]
pub fn harness_with_config(config: Config) -> TestHarness {
    let clock = Arc::new(ManualClock::new(start_time()));
    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let store = Arc::new(MemoryStore::new(clock_dyn.clone()));
    let store_dyn: Arc<dyn RemoteStore> = store.clone();

    let routes = Arc::new(RouteHistoryService::new(store_dyn.clone(), clock_dyn.clone()));
    let progression = Arc::new(ProgressionService::new(store_dyn.clone(), clock_dyn.clone()));
    let sessions = SessionService::new(
        store_dyn,
        clock_dyn,
        config.clone(),
        progression.clone(),
    );

    TestHarness {
        store,
        clock,
        config,
        sessions,
        routes,
        progression,
    }
}

impl TestHarness {
    #[allow(dead_code)]
    pub fn aggregator(&self) -> Arc<TrackingAggregator> {
        let clock_dyn: Arc<dyn Clock> = self.clock.clone();
        let store_dyn: Arc<dyn RemoteStore> = self.store.clone();
        Arc::new(TrackingAggregator::new(
            store_dyn,
            self.routes.clone(),
            clock_dyn,
            self.config.clone(),
        ))
    }

    #[allow(dead_code)]
    pub async fn seed_squad(&self, squad_id: &str) {
        self.store
            .set_document(
                collections::SQUADS,
                squad_id,
                serde_json::json!({
                    "id": squad_id,
                    "name": format!("Squad {}", squad_id),
                    "members": {},
                    "active_sessions": [],
                }),
                false,
            )
            .await
            .expect("seed squad");
    }

    #[allow(dead_code)]
    pub async fn seed_user(&self, user_id: &str, goals: Vec<WeeklyGoal>) {
        self.store
            .set_document(
                collections::USERS,
                user_id,
                serde_json::json!({
                    "id": user_id,
                    "display_name": user_id,
                    "weekly_goals": goals,
                    "consistency_rate": 0.0,
                    "squads": [],
                }),
                false,
            )
            .await
            .expect("seed user");
    }
}
