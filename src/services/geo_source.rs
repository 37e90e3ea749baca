// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS sample source: platform location wrapper contract.
//!
//! Platform adapters push raw fixes into a [`ChannelGeoSource`]; the
//! accuracy gate and minimum-displacement filter run here so downstream
//! consumers only ever see samples worth processing. Authorization loss
//! while tracking is forwarded as a forced-stop signal.

use crate::geo_utils::haversine_distance;
use crate::models::route::{GeoPoint, RoutePoint};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One GPS fix as delivered by the platform.
#[derive(Debug, Clone)]
pub struct GeoSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed_mps: Option<f64>,
    pub horizontal_accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl GeoSample {
    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn route_point(&self) -> RoutePoint {
        RoutePoint {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            speed_mps: self.speed_mps,
            horizontal_accuracy_m: Some(self.horizontal_accuracy_m),
            timestamp: self.timestamp,
        }
    }
}

/// Events a location source emits.
#[derive(Debug, Clone)]
pub enum GeoSourceEvent {
    Sample(GeoSample),
    /// Location permission revoked while active. Consumers must treat
    /// this as a forced stop.
    AuthorizationRevoked,
}

/// Horizontal-accuracy gate.
///
/// Samples beyond the ceiling are rejections, not errors: they are
/// logged at debug and dropped silently.
#[derive(Debug, Clone)]
pub struct AccuracyGate {
    ceiling_m: f64,
}

impl AccuracyGate {
    pub fn new(ceiling_m: f64) -> Self {
        Self { ceiling_m }
    }

    pub fn accept(&self, sample: &GeoSample) -> bool {
        if sample.horizontal_accuracy_m > self.ceiling_m {
            tracing::debug!(
                accuracy_m = sample.horizontal_accuracy_m,
                ceiling_m = self.ceiling_m,
                "Rejected low-accuracy sample"
            );
            return false;
        }
        true
    }
}

/// Channel-backed sample source.
///
/// The emitting side applies the accuracy gate and the configured
/// minimum displacement before forwarding, so the receiver sees the
/// filtered stream the platform API contract promises.
pub struct ChannelGeoSource {
    sender: mpsc::UnboundedSender<GeoSourceEvent>,
    gate: AccuracyGate,
    min_displacement_m: f64,
    last_forwarded: Mutex<Option<GeoPoint>>,
}

impl ChannelGeoSource {
    pub fn new(
        accuracy_ceiling_m: f64,
        min_displacement_m: f64,
    ) -> (Self, mpsc::UnboundedReceiver<GeoSourceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                gate: AccuracyGate::new(accuracy_ceiling_m),
                min_displacement_m,
                last_forwarded: Mutex::new(None),
            },
            receiver,
        )
    }

    /// Push a raw platform fix. Returns whether it was forwarded.
    pub fn push_sample(&self, sample: GeoSample) -> bool {
        if !self.gate.accept(&sample) {
            return false;
        }

        let mut last = self.last_forwarded.lock().unwrap();
        if let Some(prev) = *last {
            let displacement = haversine_distance(
                prev.latitude,
                prev.longitude,
                sample.latitude,
                sample.longitude,
            );
            if displacement < self.min_displacement_m {
                return false;
            }
        }
        *last = Some(sample.geo_point());

        self.sender.send(GeoSourceEvent::Sample(sample)).is_ok()
    }

    /// Signal that location authorization was revoked.
    pub fn revoke_authorization(&self) {
        tracing::warn!("Location authorization revoked");
        let _ = self.sender.send(GeoSourceEvent::AuthorizationRevoked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64, lon: f64, accuracy: f64) -> GeoSample {
        GeoSample {
            latitude: lat,
            longitude: lon,
            altitude: None,
            speed_mps: Some(3.0),
            horizontal_accuracy_m: accuracy,
            timestamp: DateTime::from_timestamp(1_750_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_accuracy_gate() {
        let gate = AccuracyGate::new(50.0);
        assert!(gate.accept(&sample(0.0, 0.0, 50.0)));
        assert!(!gate.accept(&sample(0.0, 0.0, 75.0)));
    }

    #[tokio::test]
    async fn test_source_filters_and_forwards() {
        let (source, mut receiver) = ChannelGeoSource::new(50.0, 5.0);

        assert!(source.push_sample(sample(0.0, 0.0, 10.0)));
        // Same spot: below minimum displacement.
        assert!(!source.push_sample(sample(0.0, 0.0, 10.0)));
        // Inaccurate: gated.
        assert!(!source.push_sample(sample(0.01, 0.0, 80.0)));
        // Far enough and accurate.
        assert!(source.push_sample(sample(0.01, 0.0, 10.0)));

        source.revoke_authorization();

        assert!(matches!(
            receiver.recv().await,
            Some(GeoSourceEvent::Sample(_))
        ));
        assert!(matches!(
            receiver.recv().await,
            Some(GeoSourceEvent::Sample(_))
        ));
        assert!(matches!(
            receiver.recv().await,
            Some(GeoSourceEvent::AuthorizationRevoked)
        ));
    }
}
