//! Feasibility filtering of fragments against the requested distance.

use std::sync::Arc;

use tracing::debug;

use crate::fragment::Fragment;
use crate::geo::GeoPoint;

/// Share of the target distance a fragment must exceed to be worth using.
const MIN_SHARE: f64 = 0.1;

/// Share of the target distance tolerated above it by the lower-bound filter.
const LOWER_BOUND_SLACK: f64 = 0.1;

/// Every n-th share of a fragment's points checked by the containment filter.
const CONTAINMENT_SAMPLE_SHARE: f64 = 0.1;

/// Options for the optional stages of the feasibility filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterOptions {
    /// Additionally require sampled points to stay within half the target
    /// distance of the query start.
    pub containment: bool,
}

/// Fragment that survived filtering, annotated with its lower bound.
#[derive(Debug, Clone)]
pub struct FeasibleFragment {
    pub fragment: Arc<Fragment>,
    /// Fragment distance plus the straight-line gaps from the query start to
    /// both fragment endpoints.
    pub lower_bound_distance: f64,
}

/// Keep fragments strictly between a tenth of the target and the target.
pub fn distance_filter(fragments: &[Arc<Fragment>], distance: f64) -> Vec<Arc<Fragment>> {
    let min = distance * MIN_SHARE;
    fragments
        .iter()
        .filter(|fragment| {
            let keep = fragment.distance > min && fragment.distance < distance;
            if !keep {
                debug!(
                    fragment = fragment.id,
                    length = fragment.distance,
                    "fragment outside distance window"
                );
            }
            keep
        })
        .cloned()
        .collect()
}

/// Lower bound on the total distance of a route that includes `fragment`.
pub fn lower_bound_distance(fragment: &Fragment, start: GeoPoint) -> f64 {
    let to_start = start.distance_to(&fragment.start());
    let to_end = start.distance_to(&fragment.end());
    fragment.distance + to_start + to_end
}

/// Annotate fragments with their lower bound and drop those that would overshoot
/// the target by more than the tolerated slack.
pub fn lower_bound_filter(
    fragments: &[Arc<Fragment>],
    start: GeoPoint,
    distance: f64,
) -> Vec<FeasibleFragment> {
    fragments
        .iter()
        .filter_map(|fragment| {
            let lower_bound = lower_bound_distance(fragment, start);
            if lower_bound - distance * LOWER_BOUND_SLACK > distance {
                debug!(
                    fragment = fragment.id,
                    lower_bound, "route with this fragment is too long"
                );
                return None;
            }
            Some(FeasibleFragment {
                fragment: Arc::clone(fragment),
                lower_bound_distance: lower_bound,
            })
        })
        .collect()
}

/// Drop fragments whose sampled points leave the circle of `radius` meters
/// around `start`.
pub fn containment_filter(
    feasible: Vec<FeasibleFragment>,
    start: GeoPoint,
    radius: f64,
) -> Vec<FeasibleFragment> {
    feasible
        .into_iter()
        .filter(|candidate| {
            let waypoints = candidate.fragment.waypoints();
            let stride = ((waypoints.len() as f64 * CONTAINMENT_SAMPLE_SHARE).ceil() as usize).max(1);
            let contained = waypoints
                .iter()
                .step_by(stride)
                .all(|point| start.distance_to(point) <= radius);
            if !contained {
                debug!(fragment = candidate.fragment.id, "fragment leaves search radius");
            }
            contained
        })
        .collect()
}

/// Run the full feasibility filter.
pub fn filter_fragments(
    fragments: &[Arc<Fragment>],
    start: GeoPoint,
    distance: f64,
    options: &FilterOptions,
) -> Vec<FeasibleFragment> {
    let within_window = distance_filter(fragments, distance);
    let mut feasible = lower_bound_filter(&within_window, start, distance);
    if options.containment {
        feasible = containment_filter(feasible, start, distance / 2.0);
    }
    debug!(
        input = fragments.len(),
        distance_window = within_window.len(),
        feasible = feasible.len(),
        "feasibility filter finished"
    );
    feasible
}
