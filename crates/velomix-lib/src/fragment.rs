//! Stored building blocks for generated routes.
//!
//! Routes and segments carry an ordered geometry; activities and provider
//! segments may additionally carry an explicit start/end pair. Both shapes are
//! resolved once into a [`Fragment`] with uniform start, end, and waypoint
//! accessors so the pipeline never has to care where a fragment came from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{GeoId, GeoPoint};

/// Numeric identifier for a stored fragment.
pub type FragmentId = i64;

/// Origin of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Route,
    Segment,
    Activity,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Route => "route",
            FragmentKind::Segment => "segment",
            FragmentKind::Activity => "activity",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FragmentKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "route" => Ok(FragmentKind::Route),
            "segment" => Ok(FragmentKind::Segment),
            "activity" => Ok(FragmentKind::Activity),
            _ => Err(Error::UnknownFragmentKind {
                value: value.to_string(),
            }),
        }
    }
}

/// Geo-point of a fragment geometry with its storage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub id: GeoId,
    pub point: GeoPoint,
}

/// Raw fragment as read from storage, before endpoints are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id: FragmentId,
    pub title: String,
    pub kind: FragmentKind,
    pub distance: f64,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub points: Vec<TrackPoint>,
    #[serde(default)]
    pub start_latlng: Option<GeoPoint>,
    #[serde(default)]
    pub end_latlng: Option<GeoPoint>,
}

/// Immutable fragment with resolved endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub title: String,
    pub kind: FragmentKind,
    pub distance: f64,
    pub owner: Option<String>,
    pub points: Vec<TrackPoint>,
    start: GeoPoint,
    end: GeoPoint,
}

impl Fragment {
    /// Resolve a stored record. Provider-supplied endpoints win over the
    /// geometry; a record with neither yields `None`.
    pub fn from_record(record: FragmentRecord) -> Option<Self> {
        let start = record
            .start_latlng
            .or_else(|| record.points.first().map(|p| p.point))?;
        let end = record
            .end_latlng
            .or_else(|| record.points.last().map(|p| p.point))?;

        Some(Self {
            id: record.id,
            title: record.title,
            kind: record.kind,
            distance: record.distance,
            owner: record.owner,
            points: record.points,
            start,
            end,
        })
    }

    pub fn start(&self) -> GeoPoint {
        self.start
    }

    pub fn end(&self) -> GeoPoint {
        self.end
    }

    pub fn is_activity(&self) -> bool {
        self.kind == FragmentKind::Activity
    }

    /// Ordered waypoints. Falls back to the endpoints when no geometry exists.
    pub fn waypoints(&self) -> Vec<GeoPoint> {
        if self.points.is_empty() {
            vec![self.start, self.end]
        } else {
            self.points.iter().map(|p| p.point).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(points: Vec<TrackPoint>) -> FragmentRecord {
        FragmentRecord {
            id: 7,
            title: "Saarschleife".to_string(),
            kind: FragmentKind::Segment,
            distance: 2500.0,
            owner: None,
            points,
            start_latlng: None,
            end_latlng: None,
        }
    }

    fn tp(id: GeoId, lat: f64, lng: f64) -> TrackPoint {
        TrackPoint {
            id,
            point: GeoPoint::new(lat, lng),
        }
    }

    #[test]
    fn endpoints_default_to_geometry() {
        let fragment =
            Fragment::from_record(record(vec![tp(1, 49.0, 7.0), tp(2, 49.1, 7.1)])).unwrap();
        assert_eq!(fragment.start(), GeoPoint::new(49.0, 7.0));
        assert_eq!(fragment.end(), GeoPoint::new(49.1, 7.1));
    }

    #[test]
    fn provider_endpoints_take_precedence() {
        let mut rec = record(vec![tp(1, 49.0, 7.0), tp(2, 49.1, 7.1)]);
        rec.start_latlng = Some(GeoPoint::new(48.0, 6.0));
        let fragment = Fragment::from_record(rec).unwrap();
        assert_eq!(fragment.start(), GeoPoint::new(48.0, 6.0));
        assert_eq!(fragment.end(), GeoPoint::new(49.1, 7.1));
    }

    #[test]
    fn record_without_any_geometry_is_rejected() {
        assert!(Fragment::from_record(record(Vec::new())).is_none());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Activity".parse::<FragmentKind>().unwrap(), FragmentKind::Activity);
        assert!("ride".parse::<FragmentKind>().is_err());
    }
}
