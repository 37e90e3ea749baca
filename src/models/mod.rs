// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod heartbeat;
pub mod participant;
pub mod route;
pub mod session;
pub mod squad;
pub mod user;

pub use heartbeat::ParticipantActivity;
pub use participant::{ParticipantSessionState, ParticipantStatus};
pub use route::{dedup_consecutive, GeoPoint, RouteDocument, RoutePoint, ROUTE_SCHEMA_VERSION};
pub use session::{
    CreateSessionInput, RunType, Session, SessionStats, SessionStatus, Visibility,
};
pub use squad::{Squad, SquadRole};
pub use user::{UserProfile, WeeklyGoal};
