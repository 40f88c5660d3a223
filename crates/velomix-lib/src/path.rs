//! Randomized bounded-depth search for fragment combinations.
//!
//! Each search runs a fixed number of independent depth-first trials from the
//! start pseudo-node to the end pseudo-node. Trials differ in their depth
//! window and in the order successors are visited: between trials the
//! successor lists are re-sorted by a jittered lower bound so that repeated
//! trials surface different combinations instead of the same best-first path.

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, trace};

use crate::graph::{compare_descending, Graph, GraphMode, NodeId, END_NODE, START_NODE};

/// Upper cap applied to the scaled depth before the trial offset.
const MAX_SCALED_DEPTH: usize = 6;

/// Key used to collapse duplicate paths across trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupKey {
    /// Paths with identical cumulative distance are duplicates.
    #[default]
    TotalDistance,
    /// Paths visiting the same node sequence are duplicates.
    NodeSequence,
}

/// Search tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub trials: usize,
    /// Completed paths accepted per trial.
    pub stop_after: usize,
    /// Inclusive multiplier band used when re-sorting successors.
    pub jitter: (f64, f64),
    pub dedup: DedupKey,
    /// Node expansions allowed per trial before it gives up.
    pub expansion_budget: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            trials: 10,
            stop_after: 1,
            jitter: (0.9, 1.1),
            dedup: DedupKey::TotalDistance,
            expansion_budget: 250_000,
        }
    }
}

/// Depth window of a single trial, counted in fragment nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBounds {
    pub min_depth: usize,
    pub max_depth: usize,
}

/// Minimum number of fragment legs for a route of `distance` meters.
pub fn base_min_depth(distance: f64) -> usize {
    let scaled = (distance / 20_000.0).floor().clamp(1.0, 3.0) as usize;
    2 + scaled
}

/// Depth window of trial `trial` for a given base depth.
pub fn trial_bounds(base_min_depth: usize, trial: usize) -> DepthBounds {
    let offset = trial % 3;
    let min_depth = base_min_depth + offset;
    let scaled = (min_depth as f64 * 1.5).ceil() as usize;
    DepthBounds {
        min_depth,
        max_depth: scaled.min(MAX_SCALED_DEPTH) + offset,
    }
}

/// Completed start-to-end path.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundPath {
    /// Fragment nodes in visiting order (pseudo-nodes excluded).
    pub nodes: Vec<NodeId>,
    /// Sum of gaps and fragment distances along the path.
    pub distance: f64,
    pub trial: usize,
    pub bounds: DepthBounds,
}

/// Run all trials over `graph` and return deduplicated paths.
///
/// Familiar graphs only accept paths containing at least one activity node.
pub fn search_paths<R: Rng + ?Sized>(
    graph: &Graph,
    distance: f64,
    options: &SearchOptions,
    rng: &mut R,
) -> Vec<FoundPath> {
    if graph.fragment_node_count() == 0 || options.trials == 0 {
        return Vec::new();
    }

    let base = base_min_depth(distance);
    let require_activity = graph.mode() == GraphMode::Familiar;
    if require_activity && !graph.nodes().iter().any(|node| node.is_activity) {
        debug!("familiar graph has no activity node, skipping search");
        return Vec::new();
    }
    let mut order: Vec<Vec<usize>> = graph
        .nodes()
        .iter()
        .map(|node| (0..graph.successors(node.id).len()).collect())
        .collect();

    let mut paths = Vec::new();
    for trial in 0..options.trials {
        if trial > 0 {
            if trial % 3 == 0 {
                for node in 0..order.len() {
                    reshuffle(graph, &mut order, node, options.jitter, rng);
                }
            } else {
                reshuffle(graph, &mut order, START_NODE, options.jitter, rng);
            }
        }

        let bounds = trial_bounds(base, trial);
        let mut search = Trial {
            graph,
            order: &order,
            distance,
            bounds,
            require_activity,
            stop_after: options.stop_after,
            budget: options.expansion_budget,
            visited: vec![false; graph.nodes().len()],
            stack: Vec::with_capacity(bounds.max_depth),
            found: Vec::new(),
        };
        search.extend(START_NODE, 0.0);
        trace!(
            trial,
            found = search.found.len(),
            exhausted = search.budget == 0,
            "search trial finished"
        );

        paths.extend(search.found.into_iter().map(|(nodes, total)| FoundPath {
            nodes,
            distance: total,
            trial,
            bounds,
        }));
    }

    let found = paths.len();
    let paths = dedup_paths(paths, options.dedup);
    debug!(
        mode = %graph.mode(),
        base_min_depth = base,
        found,
        unique = paths.len(),
        "path search finished"
    );
    paths
}

/// Collapse duplicates, keeping the first occurrence.
pub fn dedup_paths(paths: Vec<FoundPath>, key: DedupKey) -> Vec<FoundPath> {
    match key {
        DedupKey::TotalDistance => {
            let mut seen = HashSet::new();
            paths
                .into_iter()
                .filter(|path| seen.insert(path.distance.to_bits()))
                .collect()
        }
        DedupKey::NodeSequence => {
            let mut seen = HashSet::new();
            paths
                .into_iter()
                .filter(|path| seen.insert(path.nodes.clone()))
                .collect()
        }
    }
}

fn reshuffle<R: Rng + ?Sized>(
    graph: &Graph,
    order: &mut [Vec<usize>],
    node: NodeId,
    jitter: (f64, f64),
    rng: &mut R,
) {
    let edges = graph.successors(node);
    let mut keyed: Vec<(f64, usize)> = order[node]
        .iter()
        .map(|&index| {
            let factor = rng.gen_range(jitter.0..=jitter.1);
            (graph.node(edges[index].target).lower_bound_distance * factor, index)
        })
        .collect();
    keyed.sort_by(|a, b| compare_descending(a.0, b.0));
    order[node] = keyed.into_iter().map(|(_, index)| index).collect();
}

struct Trial<'a> {
    graph: &'a Graph,
    order: &'a [Vec<usize>],
    distance: f64,
    bounds: DepthBounds,
    require_activity: bool,
    stop_after: usize,
    budget: usize,
    visited: Vec<bool>,
    stack: Vec<NodeId>,
    found: Vec<(Vec<NodeId>, f64)>,
}

impl Trial<'_> {
    fn quota_met(&self) -> bool {
        self.found.len() >= self.stop_after || self.budget == 0
    }

    fn extend(&mut self, current: NodeId, cumulative: f64) {
        let graph = self.graph;
        let order = self.order;
        let edges = graph.successors(current);
        for &index in &order[current] {
            if self.quota_met() {
                return;
            }

            let edge = edges[index];
            let target = graph.node(edge.target);
            let next_distance = cumulative + edge.distance + target.distance;
            if next_distance >= self.distance {
                continue;
            }

            if edge.target == END_NODE {
                if self.accepts_current_path() {
                    self.found.push((self.stack.clone(), next_distance));
                }
                continue;
            }

            if self.visited[edge.target] || self.stack.len() >= self.bounds.max_depth {
                continue;
            }

            self.budget -= 1;
            self.visited[edge.target] = true;
            self.stack.push(edge.target);
            self.extend(edge.target, next_distance);
            self.stack.pop();
            self.visited[edge.target] = false;
        }
    }

    fn accepts_current_path(&self) -> bool {
        if self.stack.len() < self.bounds.min_depth {
            return false;
        }
        if self.require_activity {
            return self
                .stack
                .iter()
                .any(|&node| self.graph.node(node).is_activity);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_depth_scales_with_distance() {
        assert_eq!(base_min_depth(5_000.0), 3);
        assert_eq!(base_min_depth(10_000.0), 3);
        assert_eq!(base_min_depth(40_000.0), 4);
        assert_eq!(base_min_depth(60_000.0), 5);
        assert_eq!(base_min_depth(500_000.0), 5);
    }

    #[test]
    fn trial_bounds_cycle_every_three_trials() {
        assert_eq!(
            trial_bounds(3, 0),
            DepthBounds {
                min_depth: 3,
                max_depth: 5
            }
        );
        assert_eq!(
            trial_bounds(3, 1),
            DepthBounds {
                min_depth: 4,
                max_depth: 7
            }
        );
        assert_eq!(
            trial_bounds(3, 2),
            DepthBounds {
                min_depth: 5,
                max_depth: 8
            }
        );
        assert_eq!(trial_bounds(3, 3), trial_bounds(3, 0));
        assert_eq!(
            trial_bounds(5, 2),
            DepthBounds {
                min_depth: 7,
                max_depth: 8
            }
        );
    }

    #[test]
    fn dedup_by_distance_keeps_first_occurrence() {
        let bounds = trial_bounds(3, 0);
        let paths = vec![
            FoundPath {
                nodes: vec![2, 4, 6],
                distance: 9000.0,
                trial: 0,
                bounds,
            },
            FoundPath {
                nodes: vec![3, 5, 7],
                distance: 9000.0,
                trial: 1,
                bounds,
            },
            FoundPath {
                nodes: vec![2, 4, 6],
                distance: 8000.0,
                trial: 2,
                bounds,
            },
        ];

        let by_distance = dedup_paths(paths.clone(), DedupKey::TotalDistance);
        assert_eq!(by_distance.len(), 2);
        assert_eq!(by_distance[0].trial, 0);

        let by_nodes = dedup_paths(paths, DedupKey::NodeSequence);
        assert_eq!(by_nodes.len(), 2);
        assert_eq!(by_nodes[1].trial, 1);
    }
}
