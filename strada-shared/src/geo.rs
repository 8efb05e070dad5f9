use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another point, in kilometers.
    pub fn distance_km(&self, other: Coordinates) -> f64 {
        haversine_km(*self, other)
    }
}

/// Haversine great-circle distance between two points, in kilometers.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Cross-track distance: how far `point` sits off the great-circle path
/// from `start` to `end`, in kilometers. Always non-negative.
pub fn cross_track_km(start: Coordinates, end: Coordinates, point: Coordinates) -> f64 {
    let angular_dist = haversine_km(start, point) / EARTH_RADIUS_KM;
    let bearing_to_point = initial_bearing_rad(start, point);
    let bearing_to_end = initial_bearing_rad(start, end);

    (angular_dist.sin() * (bearing_to_point - bearing_to_end).sin()).asin().abs() * EARTH_RADIUS_KM
}

fn initial_bearing_rad(from: Coordinates, to: Coordinates) -> f64 {
    let lat_from = from.lat.to_radians();
    let lat_to = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * lat_to.cos();
    let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * d_lng.cos();
    y.atan2(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // Berlin -> Paris is roughly 878 km.
        let berlin = Coordinates::new(52.5200, 13.4050);
        let paris = Coordinates::new(48.8566, 2.3522);

        let dist = haversine_km(berlin, paris);
        assert!((dist - 878.0).abs() < 10.0, "got {dist}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = Coordinates::new(10.0, 20.0);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn cross_track_near_zero_on_path() {
        let start = Coordinates::new(0.0, 0.0);
        let end = Coordinates::new(0.0, 1.0);
        let on_path = Coordinates::new(0.0, 0.5);

        assert!(cross_track_km(start, end, on_path) < 0.01);
    }

    #[test]
    fn cross_track_detects_offset() {
        let start = Coordinates::new(0.0, 0.0);
        let end = Coordinates::new(0.0, 1.0);
        // Roughly 11 km north of the path midpoint.
        let off_path = Coordinates::new(0.1, 0.5);

        let deviation = cross_track_km(start, end, off_path);
        assert!((deviation - 11.1).abs() < 0.5, "got {deviation}");
    }
}
