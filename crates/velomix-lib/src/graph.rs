//! Successor graph over feasible fragments.
//!
//! Every fragment contributes a forward and an inverse node; the start and end
//! pseudo-nodes anchor each search.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::filter::FeasibleFragment;
use crate::fragment::Fragment;
use crate::geo::GeoPoint;

/// Index of a node inside a [`Graph`].
pub type NodeId = usize;

/// Synthetic node anchored at the query start.
pub const START_NODE: NodeId = 0;

/// Synthetic node anchored at the query end.
pub const END_NODE: NodeId = 1;

/// Which fragments a graph was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
    /// Routes and segments, favouring novel terrain.
    Explorative,
    /// The user's activities and routes, favouring known terrain.
    Familiar,
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            GraphMode::Explorative => "explorative",
            GraphMode::Familiar => "familiar",
        };
        f.write_str(value)
    }
}

/// Direction in which a node traverses its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Inverse => "inverse",
        }
    }
}

/// Directed traversal of a fragment, or one of the two pseudo-nodes.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub fragment: Option<Arc<Fragment>>,
    pub direction: Direction,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance: f64,
    pub lower_bound_distance: f64,
    pub is_activity: bool,
    /// Structural inverse (same fragment, opposite direction).
    pub inverse: Option<NodeId>,
}

impl Node {
    fn pseudo(id: NodeId, at: GeoPoint) -> Self {
        Self {
            id,
            fragment: None,
            direction: Direction::Forward,
            start: at,
            end: at,
            distance: 0.0,
            lower_bound_distance: 0.0,
            is_activity: false,
            inverse: None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.fragment.is_none()
    }

    /// Waypoints in traversal order.
    pub fn waypoints(&self) -> Vec<GeoPoint> {
        let Some(fragment) = &self.fragment else {
            return vec![self.start];
        };
        let mut points = fragment.waypoints();
        if self.direction == Direction::Inverse {
            points.reverse();
        }
        points
    }
}

/// Successor edge; the weight is the gap between two nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    pub distance: f64,
}

/// Options applied when building a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphBuildOptions {
    /// Only link fragment nodes whose gap is within this many meters.
    pub link_radius: Option<f64>,
}

/// Successor graph over fragment traversals.
#[derive(Debug, Clone)]
pub struct Graph {
    mode: GraphMode,
    nodes: Vec<Node>,
    successors: Vec<Vec<Edge>>,
}

impl Graph {
    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Outgoing edges of a node, sorted by target lower bound (descending).
    pub fn successors(&self, id: NodeId) -> &[Edge] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of fragment nodes (pseudo-nodes excluded).
    pub fn fragment_node_count(&self) -> usize {
        self.nodes.len().saturating_sub(2)
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }
}

/// Build the successor graph for one search mode.
///
/// Each feasible fragment contributes a forward and an inverse node. The start
/// pseudo-node links to every fragment node, every fragment node links to the
/// end pseudo-node, and fragment nodes link to each other except to their own
/// inverse.
pub fn build_graph(
    mode: GraphMode,
    feasible: &[FeasibleFragment],
    start: GeoPoint,
    end: GeoPoint,
    options: &GraphBuildOptions,
) -> Graph {
    let mut nodes = Vec::with_capacity(feasible.len() * 2 + 2);
    nodes.push(Node::pseudo(START_NODE, start));
    nodes.push(Node::pseudo(END_NODE, end));

    for candidate in feasible {
        let fragment = &candidate.fragment;
        let forward = nodes.len();
        let inverse = forward + 1;
        nodes.push(Node {
            id: forward,
            fragment: Some(Arc::clone(fragment)),
            direction: Direction::Forward,
            start: fragment.start(),
            end: fragment.end(),
            distance: fragment.distance,
            lower_bound_distance: candidate.lower_bound_distance,
            is_activity: fragment.is_activity(),
            inverse: Some(inverse),
        });
        nodes.push(Node {
            id: inverse,
            fragment: Some(Arc::clone(fragment)),
            direction: Direction::Inverse,
            start: fragment.end(),
            end: fragment.start(),
            distance: fragment.distance,
            lower_bound_distance: candidate.lower_bound_distance,
            is_activity: fragment.is_activity(),
            inverse: Some(forward),
        });
    }

    let mut successors: Vec<Vec<Edge>> = vec![Vec::new(); nodes.len()];

    for node in &nodes[2..] {
        successors[START_NODE].push(Edge {
            target: node.id,
            distance: start.distance_to(&node.start),
        });
    }

    for node in &nodes[2..] {
        let edges = &mut successors[node.id];
        for other in &nodes[2..] {
            if other.id == node.id || Some(other.id) == node.inverse {
                continue;
            }
            let gap = node.end.distance_to(&other.start);
            if options.link_radius.is_some_and(|radius| gap > radius) {
                continue;
            }
            edges.push(Edge {
                target: other.id,
                distance: gap,
            });
        }
        edges.push(Edge {
            target: END_NODE,
            distance: node.end.distance_to(&end),
        });
    }

    for edges in &mut successors {
        edges.sort_by(|a, b| {
            compare_descending(
                nodes[a.target].lower_bound_distance,
                nodes[b.target].lower_bound_distance,
            )
        });
    }

    let graph = Graph {
        mode,
        nodes,
        successors,
    };
    debug!(
        mode = %mode,
        nodes = graph.fragment_node_count(),
        edges = graph.edge_count(),
        "built fragment graph"
    );
    graph
}

pub(crate) fn compare_descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
