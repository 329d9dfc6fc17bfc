//! Traversal over the active-edge graph.

use super::inner::GraphEdge;
use crate::domain::{EdgeKind, NodeId};
use crate::storage::{Reachability, TraversalDirection};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::{HashMap, HashSet, VecDeque};

/// Depth-bounded BFS over edges of one kind.
///
/// Uses an explicit queue and visited set, so malformed cyclic data
/// terminates. `truncated` is set when a node at the bound still has
/// unvisited neighbours.
pub(super) fn reachable_impl(
    graph: &DiGraph<NodeId, GraphEdge>,
    node_map: &HashMap<NodeId, NodeIndex>,
    kind: EdgeKind,
    start: &NodeId,
    direction: TraversalDirection,
    max_depth: usize,
) -> Reachability {
    let Some(&start_index) = node_map.get(start) else {
        return Reachability::default();
    };
    let direction = petgraph::Direction::from(direction);

    let mut visited = HashSet::from([start_index]);
    let mut queue = VecDeque::from([(start_index, 0usize)]);
    let mut result = Reachability::default();

    while let Some((current, depth)) = queue.pop_front() {
        let neighbours = graph
            .edges_directed(current, direction)
            .filter(|edge| edge.weight().kind == kind)
            .map(|edge| match direction {
                petgraph::Direction::Outgoing => edge.target(),
                petgraph::Direction::Incoming => edge.source(),
            });

        for next in neighbours {
            if visited.contains(&next) {
                continue;
            }
            if depth >= max_depth {
                result.truncated = true;
                continue;
            }
            visited.insert(next);
            result.nodes.push((graph[next].clone(), depth + 1));
            queue.push_back((next, depth + 1));
        }
    }

    result
        .nodes
        .sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));
    result
}

/// Whether `to` is reachable from `from` over edges of one kind, unbounded.
///
/// Used when rebuilding a store from disk, where the whole graph is in hand.
pub(super) fn has_path(
    graph: &DiGraph<NodeId, GraphEdge>,
    node_map: &HashMap<NodeId, NodeIndex>,
    kind: EdgeKind,
    from: &NodeId,
    to: &NodeId,
) -> bool {
    let (Some(&from), Some(&to)) = (node_map.get(from), node_map.get(to)) else {
        return false;
    };
    let filtered = EdgeFiltered::from_fn(graph, |edge| edge.weight().kind == kind);
    algo::has_path_connecting(&filtered, from, to, None)
}
