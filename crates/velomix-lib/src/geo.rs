//! Coordinates and great-circle distances.

use serde::{Deserialize, Serialize};

use crate::fragment::FragmentId;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Numeric identifier for a stored geo-point.
pub type GeoId = i64;

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle (haversine) distance to another point in meters.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// Earth-centred cartesian coordinates in meters on the mean sphere.
    pub fn to_cartesian(&self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lng = self.lng.to_radians();
        [
            EARTH_RADIUS_M * lat.cos() * lng.cos(),
            EARTH_RADIUS_M * lat.cos() * lng.sin(),
            EARTH_RADIUS_M * lat.sin(),
        ]
    }

    /// Whether the coordinate lies within the valid WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// `lng,lat` rendering used by OSRM-style coordinate paths.
    pub fn to_lng_lat(&self) -> String {
        format!("{},{}", self.lng, self.lat)
    }
}

/// Convert a surface distance into the equivalent straight chord length.
pub fn chord_length(surface_distance: f64) -> f64 {
    2.0 * EARTH_RADIUS_M * (surface_distance / (2.0 * EARTH_RADIUS_M)).sin()
}

/// Total length of a polyline in meters.
pub fn path_length(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// Stored geo-point together with the fragments that reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub id: GeoId,
    pub point: GeoPoint,
    #[serde(default)]
    pub fragments: Vec<FragmentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_identical_points_is_zero() {
        let p = GeoPoint::new(49.23, 7.0);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(49.0, 7.0);
        let b = GeoPoint::new(50.0, 7.0);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn cartesian_distance_matches_chord() {
        let a = GeoPoint::new(49.23, 7.0);
        let b = GeoPoint::new(49.2325, 7.0);
        let ca = a.to_cartesian();
        let cb = b.to_cartesian();
        let euclid = ((ca[0] - cb[0]).powi(2) + (ca[1] - cb[1]).powi(2) + (ca[2] - cb[2]).powi(2)).sqrt();
        let chord = chord_length(a.distance_to(&b));
        assert!((euclid - chord).abs() < 0.01, "{euclid} vs {chord}");
    }

    #[test]
    fn validity_rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(49.0, 7.0).is_valid());
        assert!(!GeoPoint::new(91.0, 7.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
