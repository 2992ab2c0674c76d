// Geometry primitives - WGS-84 coordinates, viewports and great-circle distance
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Returns the coordinate only when both axes are finite and inside WGS-84 ranges.
    pub fn checked(longitude: f64, latitude: f64) -> Option<Self> {
        let coordinate = Self::new(longitude, latitude);
        coordinate.is_valid().then_some(coordinate)
    }

    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    /// `(lon, lat)` pair, the order used by GeoJSON and the routing service.
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Map viewport in degrees. `west > east` means the box crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// Haversine great-circle distance in kilometres between two points given in degrees.
///
/// The haversine term is clamped to `[0, 1]` so rounding on near-identical or
/// near-antipodal points can never produce a negative distance or NaN.
pub fn distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let d_lat = (lat_b - lat_a).to_radians();
    let d_lon = (lon_b - lon_a).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Distance between two coordinates, or `None` when either is corrupt or the result is not finite.
pub fn checked_distance_km(a: &Coordinate, b: &Coordinate) -> Option<f64> {
    if !a.is_valid() || !b.is_valid() {
        return None;
    }
    let distance = a.distance_km(b);
    distance.is_finite().then_some(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero_apart() {
        assert_eq!(distance_km(40.0, -75.0, 40.0, -75.0), 0.0);
    }

    #[test]
    fn test_quarter_great_circle() {
        let d = distance_km(0.0, 0.0, 0.0, 90.0);
        assert!((d - 10007.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_near_identical_and_antipodal_are_stable() {
        let tiny = distance_km(51.5, -0.12, 51.500_000_000_1, -0.120_000_000_1);
        assert!(tiny >= 0.0 && tiny < 1e-6);

        let antipodal = distance_km(10.0, 20.0, -10.0, -160.0);
        assert!(antipodal.is_finite());
        assert!((antipodal - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1.0);
    }

    #[test]
    fn test_checked_distance_rejects_corrupt_coordinates() {
        let good = Coordinate::new(-122.4, 37.7);
        assert!(checked_distance_km(&good, &Coordinate::new(f64::NAN, 10.0)).is_none());
        assert!(checked_distance_km(&good, &Coordinate::new(10.0, 95.0)).is_none());
        assert!(checked_distance_km(&good, &Coordinate::new(-122.3, 37.8)).is_some());
        assert!(Coordinate::checked(200.0, 0.0).is_none());
    }
}
