//! Fragment combinations found by the search and their reduction.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::fragment::{Fragment, FragmentId, FragmentKind};
use crate::geo::GeoPoint;
use crate::graph::{compare_descending, Direction, Graph, GraphMode, NodeId};
use crate::path::FoundPath;

/// Weight that makes part count dominate the explorative sort key.
const PART_COUNT_WEIGHT: f64 = 1_000_000.0;

/// Ordered fragment traversals between the query start and end.
#[derive(Debug, Clone, PartialEq)]
pub struct Combo {
    pub mode: GraphMode,
    pub nodes: Vec<NodeId>,
    pub lower_bound_distance: f64,
}

impl Combo {
    pub fn from_path(mode: GraphMode, path: FoundPath) -> Self {
        Self {
            mode,
            nodes: path.nodes,
            lower_bound_distance: path.distance,
        }
    }

    pub fn part_count(&self) -> usize {
        self.nodes.len()
    }

    fn sort_key(&self) -> f64 {
        match self.mode {
            GraphMode::Explorative => {
                self.part_count() as f64 * PART_COUNT_WEIGHT + self.lower_bound_distance
            }
            GraphMode::Familiar => self.lower_bound_distance,
        }
    }

    /// Resolve node ids against the graph that produced them.
    pub fn populate(&self, graph: &Graph) -> PopulatedCombo {
        let parts = self
            .nodes
            .iter()
            .filter_map(|&id| {
                let node = graph.node(id);
                node.fragment.as_ref().map(|fragment| ComboPart {
                    fragment: Arc::clone(fragment),
                    direction: node.direction,
                })
            })
            .collect();
        PopulatedCombo {
            mode: self.mode,
            parts,
            lower_bound_distance: self.lower_bound_distance,
        }
    }
}

/// One fragment of a populated combo.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboPart {
    pub fragment: Arc<Fragment>,
    pub direction: Direction,
}

impl ComboPart {
    /// Fragment waypoints in traversal order.
    pub fn waypoints(&self) -> Vec<GeoPoint> {
        let mut points = self.fragment.waypoints();
        if self.direction == Direction::Inverse {
            points.reverse();
        }
        points
    }

    pub fn reference(&self) -> PartRef {
        PartRef {
            fragment_id: self.fragment.id,
            title: self.fragment.title.clone(),
            kind: self.fragment.kind,
            direction: self.direction,
        }
    }
}

/// Serializable reference to a combo part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRef {
    pub fragment_id: FragmentId,
    pub title: String,
    pub kind: FragmentKind,
    pub direction: Direction,
}

/// Combo with its fragments attached, ready for candidate generation.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatedCombo {
    pub mode: GraphMode,
    pub parts: Vec<ComboPart>,
    pub lower_bound_distance: f64,
}

/// Sort combos in place according to their mode's preference.
pub fn sort_combos(combos: &mut [Combo]) {
    combos.sort_by(|a, b| compare_descending(a.sort_key(), b.sort_key()));
}

/// Trim a sorted list to `keep` items by repeatedly dropping whichever end
/// lies farther from `target`.
///
/// When both ends are equally far the last item is dropped.
pub fn keep_best<T, F>(items: Vec<T>, keep: usize, target: f64, distance: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    let mut items: VecDeque<T> = items.into();
    while items.len() > keep {
        let (Some(first), Some(last)) = (items.front(), items.back()) else {
            break;
        };
        let first_deviation = (distance(first) - target).abs();
        let last_deviation = (distance(last) - target).abs();
        if first_deviation > last_deviation {
            items.pop_front();
        } else {
            items.pop_back();
        }
    }
    items.into()
}

/// Sort and trim combos to the `keep` closest to `target`.
pub fn reduce_combos(mut combos: Vec<Combo>, keep: usize, target: f64) -> Vec<Combo> {
    sort_combos(&mut combos);
    keep_best(combos, keep, target, |combo| combo.lower_bound_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combo(mode: GraphMode, parts: usize, distance: f64) -> Combo {
        Combo {
            mode,
            nodes: (2..2 + parts).collect(),
            lower_bound_distance: distance,
        }
    }

    #[test]
    fn explorative_sort_prefers_more_parts() {
        let mut combos = vec![
            combo(GraphMode::Explorative, 3, 9500.0),
            combo(GraphMode::Explorative, 4, 6000.0),
            combo(GraphMode::Explorative, 3, 9900.0),
        ];
        sort_combos(&mut combos);
        let order: Vec<_> = combos
            .iter()
            .map(|c| (c.part_count(), c.lower_bound_distance))
            .collect();
        assert_eq!(order, vec![(4, 6000.0), (3, 9900.0), (3, 9500.0)]);
    }

    #[test]
    fn familiar_sort_uses_lower_bound_only() {
        let mut combos = vec![
            combo(GraphMode::Familiar, 5, 7000.0),
            combo(GraphMode::Familiar, 3, 9000.0),
        ];
        sort_combos(&mut combos);
        assert_eq!(combos[0].lower_bound_distance, 9000.0);
    }

    #[test]
    fn keep_best_trims_the_farther_extreme() {
        let distances = vec![12_000.0, 10_500.0, 9_900.0, 9_000.0, 4_000.0];
        let kept = keep_best(distances, 3, 10_000.0, |d| *d);
        assert_eq!(kept, vec![10_500.0, 9_900.0, 9_000.0]);
    }

    #[test]
    fn keep_best_returns_short_lists_unchanged() {
        let kept = keep_best(vec![1.0, 2.0], 3, 10.0, |d| *d);
        assert_eq!(kept, vec![1.0, 2.0]);
    }

    #[test]
    fn keep_best_converges_to_exactly_keep_items() {
        for len in 4..20 {
            let distances: Vec<f64> = (0..len).map(|i| 20_000.0 - i as f64 * 1_000.0).collect();
            let kept = keep_best(distances.clone(), 3, 10_000.0, |d| *d);
            assert_eq!(kept.len(), 3);
            let worst_kept = kept
                .iter()
                .map(|d| (d - 10_000.0).abs())
                .fold(0.0, f64::max);
            for dropped in distances.iter().filter(|d| !kept.contains(d)) {
                assert!((dropped - 10_000.0).abs() >= worst_kept);
            }
        }
    }
}
