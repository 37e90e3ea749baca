// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route persistence across the two on-disk schemas.
//!
//! Reads prefer the v2 batched document and fall back to the legacy
//! per-point subcollection when the v2 document is absent or partially
//! written. Both paths collapse consecutive duplicate coordinates before
//! returning. Writers keep both encoders alive while legacy data exists:
//! the aggregator's periodic flush appends legacy points, the autosave
//! and final save write the v2 document.

use crate::error::{AppError, Result};
use crate::models::route::{dedup_consecutive, RouteDocument, RoutePoint};
use crate::store::{collections, OrderBy, RemoteStore, WriteOp};
use crate::time_utils::Clock;
use serde::Serialize;
use std::sync::Arc;

/// Legacy per-point document. Carries an explicit millisecond timestamp
/// for stable ordering independent of string formatting.
#[derive(Debug, Serialize)]
struct LegacyPointDoc<'a> {
    #[serde(flatten)]
    point: &'a RoutePoint,
    timestamp_ms: i64,
}

pub struct RouteHistoryService {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
}

impl RouteHistoryService {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Build the batch operations for a legacy per-point append.
    pub fn legacy_point_writes(
        &self,
        session_id: &str,
        user_id: &str,
        points: &[RoutePoint],
    ) -> Result<Vec<WriteOp>> {
        let collection = collections::legacy_route_points(session_id, user_id);
        points
            .iter()
            .map(|point| {
                let timestamp_ms = point.timestamp.timestamp_millis();
                let doc = LegacyPointDoc {
                    point,
                    timestamp_ms,
                };
                Ok(WriteOp::Set {
                    collection: collection.clone(),
                    id: timestamp_ms.to_string(),
                    fields: serde_json::to_value(&doc).map_err(|e| {
                        AppError::Internal(anyhow::anyhow!("serialize point: {}", e))
                    })?,
                    merge: false,
                })
            })
            .collect()
    }

    /// Append points in the legacy schema as one atomic batch.
    pub async fn append_legacy_points(
        &self,
        session_id: &str,
        user_id: &str,
        points: &[RoutePoint],
    ) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let ops = self.legacy_point_writes(session_id, user_id, points)?;
        self.store.batch_write(ops).await
    }

    /// Write the full v2 route document for (session, user).
    ///
    /// Called by the periodic autosave and by the final save at stop.
    pub async fn save_route(
        &self,
        session_id: &str,
        user_id: &str,
        points: &[RoutePoint],
    ) -> Result<()> {
        let doc = RouteDocument::from_points(points, self.clock.now());
        let doc_id = collections::route_doc_id(session_id, user_id);
        self.store
            .set_document(
                collections::ROUTES,
                &doc_id,
                serde_json::to_value(&doc)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize route: {}", e)))?,
                false,
            )
            .await?;
        tracing::debug!(
            session_id,
            user_id,
            points = points.len(),
            "Saved v2 route document"
        );
        Ok(())
    }

    /// Load the route for (session, user), deduplicated.
    ///
    /// Tries the v2 document first; a missing or partially-written one
    /// (mismatched arrays) falls back to the legacy reader.
    pub async fn load_route(&self, session_id: &str, user_id: &str) -> Result<Vec<RoutePoint>> {
        let doc_id = collections::route_doc_id(session_id, user_id);

        if let Some(snapshot) = self.store.get_document(collections::ROUTES, &doc_id).await? {
            match snapshot.decode::<RouteDocument>() {
                Ok(doc) if doc.is_readable() => {
                    return Ok(dedup_consecutive(doc.to_route_points()));
                }
                Ok(_) => {
                    tracing::warn!(
                        session_id,
                        user_id,
                        "Partial v2 route document, falling back to legacy points"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        session_id,
                        user_id,
                        error = %err,
                        "Undecodable v2 route document, falling back to legacy points"
                    );
                }
            }
        }

        self.load_legacy_route(session_id, user_id).await
    }

    async fn load_legacy_route(&self, session_id: &str, user_id: &str) -> Result<Vec<RoutePoint>> {
        let collection = collections::legacy_route_points(session_id, user_id);
        let snapshots = self
            .store
            .run_query(&collection, &[], Some(OrderBy::asc("timestamp_ms")), None)
            .await?;

        let mut points = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            // One corrupt point must not fail the whole route.
            match snapshot.decode::<RoutePoint>() {
                Ok(point) => points.push(point),
                Err(err) => {
                    tracing::warn!(id = %snapshot.id, error = %err, "Skipping undecodable route point");
                }
            }
        }
        Ok(dedup_consecutive(points))
    }
}
