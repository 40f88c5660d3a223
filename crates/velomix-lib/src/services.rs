//! Contracts of the collaborators the pipeline depends on.
//!
//! The pipeline only talks to storage, the spatial index, and the routing
//! service through these traits. [`crate::db::SqliteStore`],
//! [`crate::spatial::SpatialIndex`], and [`crate::directions::DirectionsClient`]
//! are the shipped implementations; tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;

use crate::combo::PartRef;
use crate::error::Result;
use crate::familiarity::VisitedGeography;
use crate::fragment::{Fragment, FragmentKind};
use crate::geo::{Geo, GeoPoint};
use crate::graph::GraphMode;

/// Selection applied when listing fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentCriteria {
    /// Exclusive lower distance bound in meters.
    pub min_distance: Option<f64>,
    /// Exclusive upper distance bound in meters.
    pub max_distance: Option<f64>,
    /// Allowed kinds; empty means all kinds.
    pub kinds: Vec<FragmentKind>,
    /// Restrict activities to this owner. Other kinds are unaffected.
    pub activity_owner: Option<String>,
    /// Skip fragments without stored geometry.
    pub require_geometry: bool,
}

impl FragmentCriteria {
    /// Fragments shorter than `max_distance` of the given kinds with geometry.
    pub fn shorter_than(max_distance: f64, kinds: &[FragmentKind]) -> Self {
        Self {
            min_distance: None,
            max_distance: Some(max_distance),
            kinds: kinds.to_vec(),
            activity_owner: None,
            require_geometry: true,
        }
    }

    pub fn with_activity_owner(mut self, owner: impl Into<String>) -> Self {
        self.activity_owner = Some(owner.into());
        self
    }

    /// Whether a fragment satisfies the criteria.
    pub fn matches(&self, fragment: &Fragment) -> bool {
        if self.min_distance.is_some_and(|min| fragment.distance <= min) {
            return false;
        }
        if self.max_distance.is_some_and(|max| fragment.distance >= max) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&fragment.kind) {
            return false;
        }
        if let Some(owner) = &self.activity_owner {
            if fragment.is_activity() && fragment.owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        !(self.require_geometry && fragment.points.is_empty())
    }
}

/// Read access to stored fragments.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// List fragments matching `criteria`, ordered by identifier.
    async fn list(&self, criteria: &FragmentCriteria) -> Result<Vec<Fragment>>;

    /// Geo-points covered by the user's own activities.
    async fn visited_geo(&self, user: &str) -> Result<VisitedGeography>;
}

/// Radius lookups over stored geo-points.
#[async_trait]
pub trait SpatialQuery: Send + Sync {
    async fn find_within_radius(&self, center: GeoPoint, radius_m: f64) -> Result<Vec<Geo>>;
}

/// Path returned by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedPath {
    /// Routed distance in meters.
    pub distance: f64,
    pub waypoints: Vec<GeoPoint>,
}

/// External service that stitches waypoints into a rideable path.
#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn find_route(&self, waypoints: &[GeoPoint]) -> Result<RoutedPath>;
}

/// Route about to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRoute {
    pub id: String,
    pub title: String,
    pub mode: GraphMode,
    pub distance: f64,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub waypoints: Vec<GeoPoint>,
    pub parts: Vec<PartRef>,
    pub familiarity_score: Option<f64>,
}

/// Persisted generated route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRoute {
    pub id: String,
    pub title: String,
    pub mode: String,
    pub distance: f64,
    pub familiarity_score: Option<f64>,
    pub created_at: String,
    pub part_ids: Vec<i64>,
}

/// Persistence of generated routes.
#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn find_route(&self, id: &str) -> Result<Option<StoredRoute>>;

    async fn insert_route(&self, route: &NewRoute) -> Result<StoredRoute>;

    async fn update_familiarity(&self, id: &str, score: Option<f64>) -> Result<()>;
}
