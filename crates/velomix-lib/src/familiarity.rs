//! Familiarity scoring of routed candidates against a user's own rides.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::candidate::Candidate;
use crate::geo::{GeoId, GeoPoint};
use crate::graph::GraphMode;
use crate::services::SpatialQuery;

/// Geo-points a user has already ridden through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitedGeography {
    geo_ids: HashSet<GeoId>,
}

impl VisitedGeography {
    pub fn new(geo_ids: impl IntoIterator<Item = GeoId>) -> Self {
        Self {
            geo_ids: geo_ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: GeoId) -> bool {
        self.geo_ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.geo_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geo_ids.is_empty()
    }
}

impl FromIterator<GeoId> for VisitedGeography {
    fn from_iter<I: IntoIterator<Item = GeoId>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamiliarityOptions {
    /// Search radius around each sample in meters.
    pub radius: f64,
    pub max_samples: usize,
    /// Candidates kept per mode after ranking.
    pub keep: usize,
}

impl Default for FamiliarityOptions {
    fn default() -> Self {
        Self {
            radius: 280.0,
            max_samples: 25,
            keep: 1,
        }
    }
}

/// Evenly strided subset of at most `max_samples` waypoints.
pub fn sample_waypoints(waypoints: &[GeoPoint], max_samples: usize) -> Vec<GeoPoint> {
    if waypoints.is_empty() || max_samples == 0 {
        return Vec::new();
    }
    let stride = waypoints.len().div_ceil(max_samples);
    waypoints.iter().step_by(stride).copied().collect()
}

/// Share of sampled waypoints that lie near visited geography, in `[0, 1]`.
///
/// A failed spatial lookup counts as a miss.
pub async fn familiarity_score(
    waypoints: &[GeoPoint],
    visited: &VisitedGeography,
    spatial: &dyn SpatialQuery,
    options: &FamiliarityOptions,
) -> f64 {
    let samples = sample_waypoints(waypoints, options.max_samples);
    if samples.is_empty() {
        return 0.0;
    }

    let mut matches = 0usize;
    for point in &samples {
        match spatial.find_within_radius(*point, options.radius).await {
            Ok(nearby) => {
                if nearby.iter().any(|geo| visited.contains(geo.id)) {
                    matches += 1;
                }
            }
            Err(error) => {
                warn!(lat = point.lat, lng = point.lng, %error, "spatial lookup failed");
            }
        }
    }

    matches as f64 / samples.len() as f64
}

/// Score every candidate and keep the best `options.keep` for `mode`.
///
/// Explorative candidates favour the lowest score, familiar ones the highest.
pub async fn score_candidates(
    mode: GraphMode,
    mut candidates: Vec<Candidate>,
    visited: &VisitedGeography,
    spatial: &dyn SpatialQuery,
    options: &FamiliarityOptions,
) -> Vec<Candidate> {
    for candidate in &mut candidates {
        let score = familiarity_score(&candidate.waypoints, visited, spatial, options).await;
        candidate.familiarity_score = Some(score);
    }
    rank_by_familiarity(mode, &mut candidates);
    candidates.truncate(options.keep);
    debug!(mode = %mode, kept = candidates.len(), "familiarity ranking finished");
    candidates
}

/// Sort scored candidates according to the mode's preference.
pub fn rank_by_familiarity(mode: GraphMode, candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        let a = a.familiarity_score.unwrap_or(0.0);
        let b = b.familiarity_score.unwrap_or(0.0);
        match mode {
            GraphMode::Explorative => a.total_cmp(&b),
            GraphMode::Familiar => b.total_cmp(&a),
        }
    });
}
