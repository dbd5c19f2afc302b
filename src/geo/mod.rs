use std::time::Duration;

use crate::models::driver::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Straight-line speed assumed when no routing data is available.
pub const DEFAULT_SPEED_KMPH: f64 = 30.0;

pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

/// Constant-speed ETA over a straight-line distance. `None` for non-positive
/// speeds.
pub fn estimate_eta(distance_m: f64, speed_kmph: f64) -> Option<Duration> {
    if speed_kmph <= 0.0 {
        return None;
    }
    let speed_ms = speed_kmph * 1000.0 / 3600.0;
    Some(Duration::from_secs_f64(distance_m / speed_ms))
}

#[cfg(test)]
mod tests {
    use super::{estimate_eta, haversine_m, DEFAULT_SPEED_KMPH};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 11.55,
            lng: 104.92,
        };
        assert!(haversine_m(p, p) < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_m(london, paris);
        assert!((distance - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn nearby_points_resolve_to_tens_of_meters() {
        let dest = GeoPoint {
            lat: 11.5500,
            lng: 104.9200,
        };
        let far = GeoPoint {
            lat: 11.5504,
            lng: 104.9204,
        };
        let near = GeoPoint {
            lat: 11.5501,
            lng: 104.9201,
        };
        let d_far = haversine_m(dest, far);
        let d_near = haversine_m(dest, near);
        assert!(d_far > 40.0 && d_far < 80.0, "got {d_far}");
        assert!(d_near < 40.0, "got {d_near}");
    }

    #[test]
    fn eta_at_30_kmph() {
        // 30 km/h is 8.33 m/s, so 2.5 km takes 5 minutes.
        let eta = estimate_eta(2_500.0, DEFAULT_SPEED_KMPH).unwrap();
        assert!((eta.as_secs_f64() - 300.0).abs() < 1e-6);
        assert!(estimate_eta(100.0, 0.0).is_none());
    }
}
