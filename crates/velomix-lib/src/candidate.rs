//! Turning populated combos into routed candidates.

use serde::Serialize;
use tracing::{debug, warn};

use crate::combo::{keep_best, PartRef, PopulatedCombo};
use crate::geo::GeoPoint;
use crate::graph::GraphMode;
use crate::services::RoutingService;

/// Routed path built from one combo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub mode: GraphMode,
    /// Routed distance in meters.
    pub distance: f64,
    pub waypoints: Vec<GeoPoint>,
    pub parts: Vec<PartRef>,
    pub lower_bound_distance: f64,
    /// Share of the route near the user's visited geography, once scored.
    pub familiarity_score: Option<f64>,
}

impl Candidate {
    pub fn deviation(&self, target: f64) -> f64 {
        (self.distance - target).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateOptions {
    /// Upper bound on waypoints submitted per routing request, endpoints included.
    pub waypoint_cap: usize,
    /// Stop routing a mode's combos after the first successful one.
    pub stop_after_first: bool,
}

impl Default for CandidateOptions {
    fn default() -> Self {
        Self {
            waypoint_cap: 24,
            stop_after_first: false,
        }
    }
}

/// Waypoints for a routing request: the query start, every part's points
/// downsampled to fit `cap`, and the query end.
///
/// The first and last point of each part always survive downsampling.
pub fn assemble_waypoints(
    combo: &PopulatedCombo,
    start: GeoPoint,
    end: GeoPoint,
    cap: usize,
) -> Vec<GeoPoint> {
    let parts: Vec<Vec<GeoPoint>> = combo.parts.iter().map(|part| part.waypoints()).collect();
    let total: usize = parts.iter().map(Vec::len).sum();
    let longest = parts.iter().map(Vec::len).max().unwrap_or(0);
    let budget = cap.saturating_sub(2).max(1);

    let mut stride = total.div_ceil(budget).max(1);
    loop {
        let mut waypoints = Vec::with_capacity(cap);
        waypoints.push(start);
        for points in &parts {
            waypoints.extend(downsample(points, stride));
        }
        waypoints.push(end);

        if waypoints.len() <= cap || stride >= longest {
            return waypoints;
        }
        stride += 1;
    }
}

fn downsample(points: &[GeoPoint], stride: usize) -> Vec<GeoPoint> {
    let mut sampled: Vec<GeoPoint> = points.iter().step_by(stride).copied().collect();
    if let Some(&last) = points.last() {
        if (points.len() - 1) % stride != 0 {
            sampled.push(last);
        }
    }
    sampled
}

/// Route every combo and keep the `keep` candidates closest to `target`.
///
/// Combos the routing service cannot route, or routes with a non-positive
/// distance, are logged and skipped.
pub async fn generate_candidates(
    combos: &[PopulatedCombo],
    start: GeoPoint,
    end: GeoPoint,
    target: f64,
    keep: usize,
    routing: &dyn RoutingService,
    options: &CandidateOptions,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for combo in combos {
        let waypoints = assemble_waypoints(combo, start, end, options.waypoint_cap);
        let routed = match routing.find_route(&waypoints).await {
            Ok(routed) => routed,
            Err(error) => {
                warn!(
                    mode = %combo.mode,
                    parts = combo.parts.len(),
                    %error,
                    "routing failed, dropping combo"
                );
                continue;
            }
        };
        if routed.distance <= 0.0 {
            warn!(
                mode = %combo.mode,
                distance = routed.distance,
                "routing returned an empty route, dropping combo"
            );
            continue;
        }

        candidates.push(Candidate {
            mode: combo.mode,
            distance: routed.distance,
            waypoints: routed.waypoints,
            parts: combo.parts.iter().map(|part| part.reference()).collect(),
            lower_bound_distance: combo.lower_bound_distance,
            familiarity_score: None,
        });
        if options.stop_after_first {
            break;
        }
    }

    let routed = candidates.len();
    candidates.sort_by(|a, b| a.deviation(target).total_cmp(&b.deviation(target)));
    let candidates = keep_best(candidates, keep, target, |candidate| candidate.distance);
    debug!(
        combos = combos.len(),
        routed,
        kept = candidates.len(),
        "candidate generation finished"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::combo::ComboPart;
    use crate::error::{Error, Result};
    use crate::services::RoutedPath;
    use crate::fragment::{Fragment, FragmentKind, FragmentRecord, TrackPoint};
    use crate::graph::Direction;

    fn part(id: i64, len: usize, direction: Direction) -> ComboPart {
        let record = FragmentRecord {
            id,
            title: format!("part {id}"),
            kind: FragmentKind::Segment,
            distance: 3000.0,
            owner: None,
            points: (0..len)
                .map(|i| TrackPoint {
                    id: id * 1000 + i as i64,
                    point: GeoPoint::new(49.0 + id as f64 * 0.01, 7.0 + i as f64 * 0.0001),
                })
                .collect(),
            start_latlng: None,
            end_latlng: None,
        };
        ComboPart {
            fragment: Arc::new(Fragment::from_record(record).unwrap()),
            direction,
        }
    }

    fn combo(parts: Vec<ComboPart>) -> PopulatedCombo {
        PopulatedCombo {
            mode: GraphMode::Explorative,
            parts,
            lower_bound_distance: 9000.0,
        }
    }

    #[test]
    fn short_combos_keep_every_point() {
        let start = GeoPoint::new(48.0, 7.0);
        let end = GeoPoint::new(48.5, 7.0);
        let combo = combo(vec![part(1, 4, Direction::Forward), part(2, 5, Direction::Forward)]);
        let waypoints = assemble_waypoints(&combo, start, end, 24);
        assert_eq!(waypoints.len(), 11);
        assert_eq!(waypoints[0], start);
        assert_eq!(waypoints[10], end);
    }

    #[test]
    fn long_combos_fit_the_cap_and_keep_part_endpoints() {
        let start = GeoPoint::new(48.0, 7.0);
        let parts = vec![
            part(1, 400, Direction::Forward),
            part(2, 37, Direction::Inverse),
            part(3, 251, Direction::Forward),
        ];
        let combo = combo(parts.clone());
        let waypoints = assemble_waypoints(&combo, start, start, 24);
        assert!(waypoints.len() <= 24);
        for part in &parts {
            let points = part.waypoints();
            assert!(waypoints.contains(points.first().unwrap()));
            assert!(waypoints.contains(points.last().unwrap()));
        }
    }

    #[test]
    fn inverse_parts_are_traversed_backwards() {
        let start = GeoPoint::new(48.0, 7.0);
        let forward = part(1, 3, Direction::Forward);
        let inverse = ComboPart {
            direction: Direction::Inverse,
            ..forward.clone()
        };
        let waypoints = assemble_waypoints(&combo(vec![inverse]), start, start, 24);
        assert_eq!(waypoints[1], forward.waypoints()[2]);
        assert_eq!(waypoints[3], forward.waypoints()[0]);
    }

    #[test]
    fn downsample_always_appends_the_last_point() {
        let points: Vec<GeoPoint> = (0..10).map(|i| GeoPoint::new(i as f64, 0.0)).collect();
        let sampled = downsample(&points, 4);
        assert_eq!(sampled.len(), 4);
        assert_eq!(sampled.last(), points.last());
        assert_eq!(downsample(&points, 3).len(), 4);
    }

    /// Answers the n-th request with the n-th scripted distance; `None`
    /// answers with a routing failure.
    struct ScriptedRouting {
        answers: Vec<Option<f64>>,
        calls: AtomicUsize,
    }

    impl ScriptedRouting {
        fn new(answers: Vec<Option<f64>>) -> Self {
            Self {
                answers,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoutingService for ScriptedRouting {
        async fn find_route(&self, waypoints: &[GeoPoint]) -> Result<RoutedPath> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answers.get(call).copied().flatten() {
                Some(distance) => Ok(RoutedPath {
                    distance,
                    waypoints: waypoints.to_vec(),
                }),
                None => Err(Error::RoutingResponse {
                    reason: "NoRoute".to_string(),
                }),
            }
        }
    }

    fn three_combos() -> Vec<PopulatedCombo> {
        (1..=3)
            .map(|id| combo(vec![part(id, 3, Direction::Forward)]))
            .collect()
    }

    #[tokio::test]
    async fn empty_and_failed_routes_are_dropped() {
        let start = GeoPoint::new(48.0, 7.0);
        let routing = ScriptedRouting::new(vec![Some(0.0), None, Some(9_800.0)]);
        let candidates = generate_candidates(
            &three_combos(),
            start,
            start,
            10_000.0,
            2,
            &routing,
            &CandidateOptions::default(),
        )
        .await;
        assert_eq!(routing.calls(), 3);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].distance, 9_800.0);
        assert_eq!(candidates[0].parts[0].fragment_id, 3);
        assert_eq!(candidates[0].familiarity_score, None);
    }

    #[tokio::test]
    async fn candidates_are_ordered_by_deviation() {
        let start = GeoPoint::new(48.0, 7.0);
        let routing = ScriptedRouting::new(vec![Some(13_000.0), Some(10_400.0), Some(9_000.0)]);
        let candidates = generate_candidates(
            &three_combos(),
            start,
            start,
            10_000.0,
            3,
            &routing,
            &CandidateOptions::default(),
        )
        .await;
        let distances: Vec<_> = candidates.iter().map(|c| c.distance).collect();
        assert_eq!(distances, vec![10_400.0, 9_000.0, 13_000.0]);
    }

    #[tokio::test]
    async fn stop_after_first_routes_until_one_succeeds() {
        let start = GeoPoint::new(48.0, 7.0);
        let routing = ScriptedRouting::new(vec![None, Some(10_200.0), Some(10_000.0)]);
        let options = CandidateOptions {
            stop_after_first: true,
            ..CandidateOptions::default()
        };
        let candidates =
            generate_candidates(&three_combos(), start, start, 10_000.0, 2, &routing, &options)
                .await;
        assert_eq!(routing.calls(), 2);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].parts[0].fragment_id, 2);
    }
}
