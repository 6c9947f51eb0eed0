//! Great-circle distance between two points (haversine formula).

use crate::types::GeoPoint;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        let p = GeoPoint {
            lat: 19.0760,
            lng: 72.8777,
        };
        assert!(haversine_km(&p, &p) < 1e-9);
    }

    #[test]
    fn short_hop_within_mumbai() {
        // ~0.22 km due north.
        let a = GeoPoint {
            lat: 19.0760,
            lng: 72.8777,
        };
        let b = GeoPoint {
            lat: 19.0780,
            lng: 72.8777,
        };
        let d = haversine_km(&a, &b);
        assert!((d - 0.22).abs() < 0.01, "expected ~0.22 km, got {d}");
    }

    #[test]
    fn mumbai_to_delhi_is_far() {
        let mumbai = GeoPoint {
            lat: 19.0760,
            lng: 72.8777,
        };
        let delhi = GeoPoint {
            lat: 28.6139,
            lng: 77.2090,
        };
        let d = haversine_km(&mumbai, &delhi);
        // Roughly 1150 km; well outside any discovery radius.
        assert!((1100.0..1250.0).contains(&d), "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let b = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let ab = haversine_km(&a, &b);
        let ba = haversine_km(&b, &a);
        assert!((ab - ba).abs() < 1e-9);
        // Paris–London is ~344 km.
        assert!((330.0..360.0).contains(&ab), "got {ab}");
    }
}
