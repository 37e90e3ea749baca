// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background task primitives: awaited-with-deadline, best-effort, periodic.
//!
//! "Best-effort" writes are explicitly distinct from awaited writes: their
//! failures land in the logs, never in the caller. Anything a downstream
//! invariant depends on (completion checks) must use the awaited path.

use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Race `fut` against a deadline; the loser is canceled.
pub async fn with_timeout<F, T>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(what.to_string())),
    }
}

/// Set of fire-and-forget tasks.
///
/// Failures are logged with the task label. Tests call [`drain`] to
/// force-await everything pending and assert on eventual state without
/// race flakiness.
///
/// [`drain`]: BestEffortTasks::drain
#[derive(Default)]
pub struct BestEffortTasks {
    set: tokio::sync::Mutex<JoinSet<()>>,
}

impl BestEffortTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a write whose completion nobody waits on.
    pub async fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.set.lock().await.spawn(async move {
            if let Err(err) = fut.await {
                tracing::warn!(task = label, error = %err, "Best-effort task failed");
            }
        });
    }

    /// Await every spawned task. Panics inside tasks are surfaced as logs.
    pub async fn drain(&self) {
        let mut set = self.set.lock().await;
        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "Best-effort task panicked");
            }
        }
    }
}

/// Spawn a cancelable periodic loop.
///
/// Ticks are skipped (not bunched) when a firing runs long. The loop exits
/// as soon as the token is canceled.
pub fn spawn_periodic<F, Fut>(
    label: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; consume it
        // so the first real firing happens one full period in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(task = label, "Periodic task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    tick().await;
                }
            }
        }
    })
}
