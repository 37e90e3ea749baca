// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route point models and the two on-disk route schemas.
//!
//! Legacy schema: one sub-document per point under
//! `sessions/{id}/routes/{userId}/points/{timestampId}`.
//! V2 schema: a single `routes/{sessionId}_{userId}` document holding a
//! point array and a parallel timestamp array.

use crate::geo_utils::coords_equal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current route document schema version.
pub const ROUTE_SCHEMA_VERSION: u32 = 2;

/// Bare coordinate pair, as stored in the v2 point array and in
/// heartbeat last-known locations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Full-resolution GPS fix, as stored per-point in the legacy schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub horizontal_accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl RoutePoint {
    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// V2 batched route document (`routes/{sessionId}_{userId}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteDocument {
    #[serde(default)]
    pub points: Vec<GeoPoint>,
    #[serde(default)]
    pub points_timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub points_count: u32,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RouteDocument {
    /// Build a v2 document from a full point sequence.
    pub fn from_points(points: &[RoutePoint], created_at: DateTime<Utc>) -> Self {
        Self {
            points: points.iter().map(RoutePoint::geo_point).collect(),
            points_timestamps: points.iter().map(|p| p.timestamp).collect(),
            points_count: points.len() as u32,
            version: ROUTE_SCHEMA_VERSION,
            created_at: Some(created_at),
        }
    }

    /// Whether the document is complete enough to read.
    ///
    /// A partially-written document (points present, timestamps absent or
    /// of mismatched length) must not be trusted; readers fall back to
    /// the legacy per-point schema instead.
    pub fn is_readable(&self) -> bool {
        !self.points.is_empty() && self.points.len() == self.points_timestamps.len()
    }

    /// Zip the parallel arrays back into route points.
    pub fn to_route_points(&self) -> Vec<RoutePoint> {
        self.points
            .iter()
            .zip(self.points_timestamps.iter())
            .map(|(p, ts)| RoutePoint {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: None,
                speed_mps: None,
                horizontal_accuracy_m: None,
                timestamp: *ts,
            })
            .collect()
    }
}

/// Collapse consecutive points with identical coordinates.
///
/// Applied on every read path, for both schemas.
pub fn dedup_consecutive(points: Vec<RoutePoint>) -> Vec<RoutePoint> {
    let mut out: Vec<RoutePoint> = Vec::with_capacity(points.len());
    for point in points {
        let duplicate = out.last().is_some_and(|prev: &RoutePoint| {
            coords_equal(prev.latitude, prev.longitude, point.latitude, point.longitude)
        });
        if !duplicate {
            out.push(point);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64, secs: i64) -> RoutePoint {
        RoutePoint {
            latitude: lat,
            longitude: lon,
            altitude: None,
            speed_mps: None,
            horizontal_accuracy_m: None,
            timestamp: DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_dedup_collapses_consecutive_duplicates() {
        // 10 points, 3 consecutive exact duplicates -> 7 points.
        let points = vec![
            point(0.0, 0.0, 0),
            point(0.001, 0.0, 1),
            point(0.001, 0.0, 2), // dup
            point(0.001, 0.0, 3), // dup
            point(0.001, 0.0, 4), // dup
            point(0.002, 0.0, 5),
            point(0.003, 0.0, 6),
            point(0.004, 0.0, 7),
            point(0.005, 0.0, 8),
            point(0.006, 0.0, 9),
        ];
        let deduped = dedup_consecutive(points);
        assert_eq!(deduped.len(), 7);
    }

    #[test]
    fn test_dedup_keeps_nonconsecutive_repeats() {
        // An out-and-back route revisits coordinates; only consecutive
        // repeats collapse.
        let points = vec![
            point(0.0, 0.0, 0),
            point(0.001, 0.0, 1),
            point(0.0, 0.0, 2),
        ];
        assert_eq!(dedup_consecutive(points).len(), 3);
    }

    #[test]
    fn test_v2_roundtrip() {
        let points = vec![point(1.0, 2.0, 0), point(1.1, 2.1, 10)];
        let doc = RouteDocument::from_points(&points, DateTime::from_timestamp(0, 0).unwrap());

        assert!(doc.is_readable());
        assert_eq!(doc.points_count, 2);
        assert_eq!(doc.version, ROUTE_SCHEMA_VERSION);

        let restored = doc.to_route_points();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].latitude, 1.0);
        assert_eq!(restored[1].timestamp, points[1].timestamp);
    }

    #[test]
    fn test_partial_v2_document_not_readable() {
        let mut doc =
            RouteDocument::from_points(&[point(1.0, 2.0, 0)], DateTime::from_timestamp(0, 0).unwrap());
        doc.points_timestamps.clear();
        assert!(!doc.is_readable());

        let empty = RouteDocument::default();
        assert!(!empty.is_readable());
    }
}
