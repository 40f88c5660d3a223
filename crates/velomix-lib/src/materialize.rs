//! Persisting generated routes under deterministic identifiers.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::candidate::Candidate;
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::graph::GraphMode;
use crate::services::{NewRoute, RouteRepository};

/// Candidate that has been persisted (or matched an existing route).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedRoute {
    pub id: String,
    pub title: String,
    /// True when an identical route was already stored.
    pub reused: bool,
    pub candidate: Candidate,
}

impl MaterializedRoute {
    /// Identify a candidate without persisting it.
    pub fn transient(candidate: Candidate, start: GeoPoint, end: GeoPoint) -> Self {
        let title = route_title(candidate.mode, candidate.distance);
        Self {
            id: route_id(&title, candidate.distance, start, end),
            title,
            reused: false,
            candidate,
        }
    }
}

/// Human readable title of a generated route.
pub fn route_title(mode: GraphMode, distance: f64) -> String {
    let label = match mode {
        GraphMode::Explorative => "Explorative",
        GraphMode::Familiar => "Familiar",
    };
    format!("{label} ride, {:.1} km", distance / 1000.0)
}

/// Content-derived route identifier.
///
/// Hashes the title, the distance rounded to whole meters, and both
/// endpoints at six decimals, so regenerating the same route yields the same
/// identifier.
pub fn route_id(title: &str, distance: f64, start: GeoPoint, end: GeoPoint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(format!("|{:.0}", distance.round()).as_bytes());
    hasher.update(format!("|{:.6},{:.6}", start.lat, start.lng).as_bytes());
    hasher.update(format!("|{:.6},{:.6}", end.lat, end.lng).as_bytes());
    hex::encode(hasher.finalize())
}

/// Persist `candidate`, reusing an existing route with the same identifier.
///
/// A reused route only has its familiarity score refreshed.
pub async fn materialize(
    candidate: Candidate,
    start: GeoPoint,
    end: GeoPoint,
    repository: &dyn RouteRepository,
) -> Result<MaterializedRoute> {
    let title = route_title(candidate.mode, candidate.distance);
    let id = route_id(&title, candidate.distance, start, end);

    if repository.find_route(&id).await?.is_some() {
        repository
            .update_familiarity(&id, candidate.familiarity_score)
            .await?;
        debug!(route = %id, "route already stored, refreshed familiarity");
        return Ok(MaterializedRoute {
            id,
            title,
            reused: true,
            candidate,
        });
    }

    let route = NewRoute {
        id: id.clone(),
        title: title.clone(),
        mode: candidate.mode,
        distance: candidate.distance,
        start,
        end,
        waypoints: candidate.waypoints.clone(),
        parts: candidate.parts.clone(),
        familiarity_score: candidate.familiarity_score,
    };
    repository.insert_route(&route).await?;
    info!(
        route = %id,
        mode = %candidate.mode,
        distance = candidate.distance,
        "stored generated route"
    );

    Ok(MaterializedRoute {
        id,
        title,
        reused: false,
        candidate,
    })
}
