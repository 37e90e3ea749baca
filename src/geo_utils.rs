// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geographic helpers for distance accumulation and point comparison.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Coordinates closer than this (in degrees) are treated as identical
/// when collapsing consecutive duplicate route points.
pub const COORD_EPSILON: f64 = 1e-9;

/// Great-circle distance in meters between two (lat, lon) pairs.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Whether two coordinate pairs are equal within [`COORD_EPSILON`].
pub fn coords_equal(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> bool {
    (lat1 - lat2).abs() < COORD_EPSILON && (lon1 - lon2).abs() < COORD_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_distance(37.4, -122.1, 37.4, -122.1), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111.2 km.
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn test_haversine_diagonal_jump_is_huge() {
        // The classic GPS glitch: (0,0) -> (1,1) is ~157 km.
        let d = haversine_distance(0.0, 0.0, 1.0, 1.0);
        assert!(d > 150_000.0 && d < 160_000.0, "got {}", d);
    }

    #[test]
    fn test_coords_equal_epsilon() {
        assert!(coords_equal(37.4, -122.1, 37.4 + 1e-12, -122.1));
        assert!(!coords_equal(37.4, -122.1, 37.4001, -122.1));
    }
}
