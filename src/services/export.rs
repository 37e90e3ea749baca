// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPX export of recorded routes.
//!
//! A simple track document: ordered (lat, lon) points with a name and
//! creation time. Elevation is zero-filled; per-point time fidelity is
//! not carried.

use crate::models::route::RoutePoint;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use geo::Point;
use gpx::{Gpx, GpxVersion, Metadata, Track, TrackSegment, Waypoint};
use std::io::Write;

/// Errors from GPX export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No points to export")]
    Empty,

    #[error("Failed to write GPX: {0}")]
    Write(String),
}

/// Write a route as a GPX 1.1 track.
pub fn write_gpx<W: Write>(
    points: &[RoutePoint],
    name: &str,
    created_at: DateTime<Utc>,
    writer: W,
) -> Result<(), ExportError> {
    if points.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut segment = TrackSegment::default();
    for point in points {
        let mut waypoint = Waypoint::new(Point::new(point.longitude, point.latitude));
        waypoint.elevation = Some(0.0);
        segment.points.push(waypoint);
    }

    let mut track = Track::default();
    track.name = Some(name.to_string());
    track.segments.push(segment);

    let mut metadata = Metadata::default();
    metadata.name = Some(name.to_string());
    metadata.description = Some(format!("Recorded {}", format_utc_rfc3339(created_at)));

    let gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("squadrun".to_string()),
        metadata: Some(metadata),
        tracks: vec![track],
        ..Default::default()
    };

    gpx::write(&gpx, writer).map_err(|e| ExportError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> RoutePoint {
        RoutePoint {
            latitude: lat,
            longitude: lon,
            altitude: None,
            speed_mps: None,
            horizontal_accuracy_m: None,
            timestamp: DateTime::from_timestamp(1_750_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_export_writes_track() {
        let points = vec![point(37.4, -122.1), point(37.41, -122.11)];
        let mut out = Vec::new();
        write_gpx(&points, "Morning run", Utc::now(), &mut out).unwrap();

        let xml = String::from_utf8(out).unwrap();
        assert!(xml.contains("<trk>"));
        assert!(xml.contains("Morning run"));
        assert!(xml.contains("37.4"));
    }

    #[test]
    fn test_export_empty_route_fails() {
        let mut out = Vec::new();
        let err = write_gpx(&[], "Empty", Utc::now(), &mut out).unwrap_err();
        assert!(matches!(err, ExportError::Empty));
    }
}
