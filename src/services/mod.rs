// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod export;
pub mod geo_source;
pub mod progression;
pub mod route_history;
pub mod session;
pub mod tracking;

pub use export::{write_gpx, ExportError};
pub use geo_source::{AccuracyGate, ChannelGeoSource, GeoSample, GeoSourceEvent};
pub use progression::{ConsistencyReport, ConsistencyTier, ProgressionError, ProgressionService};
pub use route_history::RouteHistoryService;
pub use session::{SessionService, SessionSubscription};
pub use tracking::{TrackingAggregator, TrackingStats, TrackingSummary};
