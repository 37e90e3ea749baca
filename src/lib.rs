// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Squadrun core: session lifecycle and GPS tracking for group runs.
//!
//! This crate is the client-side core of a group-running tracker: the
//! session/participant state machine, the GPS tracking aggregator with
//! its batched write cadences, heartbeat-based liveness detection, and
//! the sync contracts against an eventually consistent remote document
//! store. UI, auth, and the backing store itself live elsewhere.

pub mod cache;
pub mod config;
pub mod error;
pub mod geo_utils;
pub mod models;
pub mod services;
pub mod store;
pub mod tasks;
pub mod time_utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON logging.
///
/// Embedders call this once at startup; tests skip it.
pub fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("squadrun_core=debug".parse().expect("valid directive"))
                .add_directive("info".parse().expect("valid directive")),
        )
        .with(format)
        .init();
}
