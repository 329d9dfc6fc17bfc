//! Transient dependency-network snapshots and the analyses run on them.
//!
//! A [`NetworkSnapshot`] is a `petgraph` copy of a node set and the active
//! dependency edges among them. It is built per request and dropped after;
//! nothing here writes back to the store.

use crate::domain::{DependencyEdge, EdgeKind, Node, NodeFilter, NodeId};
use crate::error::{Error, Result};
use crate::storage::{GraphStore, NodeProvider, TraversalDirection};
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Out-degree a node must exceed to count as a bottleneck
const BOTTLENECK_OUT_DEGREE: usize = 3;

/// Per-day lag penalty in edge weights and path costs
const LAG_FACTOR: f64 = 0.1;

/// Weight of a dependency edge.
///
/// `base(type) * (2 if critical) * impact + 0.1 * |lag|`
#[must_use]
pub fn edge_weight(edge: &DependencyEdge) -> f64 {
    critical_reward(edge) + LAG_FACTOR * f64::from(edge.lag_days.unsigned_abs())
}

fn critical_reward(edge: &DependencyEdge) -> f64 {
    let base = edge.dependency_type.base_weight() * if edge.is_critical { 2.0 } else { 1.0 };
    base * edge.impact.multiplier()
}

/// Search cost of an edge: lag is penalized, criticality and impact rewarded
fn path_cost(edge: &DependencyEdge) -> f64 {
    LAG_FACTOR * f64::from(edge.lag_days.unsigned_abs()) - critical_reward(edge)
}

/// Node flagged as a bottleneck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bottleneck {
    /// Node
    pub node_id: NodeId,
    /// Active outgoing dependencies
    pub out_degree: usize,
    /// Active incoming dependencies
    pub in_degree: usize,
}

/// Headline figures for a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    /// Nodes in the snapshot
    pub node_count: usize,
    /// Edges in the snapshot
    pub edge_count: usize,
    /// Highest topological level, `None` when empty
    pub max_level: Option<usize>,
    /// Bottlenecks, most connected first
    pub bottlenecks: Vec<Bottleneck>,
    /// Strongly connected components of size > 1
    pub cycles: Vec<Vec<NodeId>>,
    /// Mean local clustering coefficient
    pub clustering_coefficient: f64,
    /// Directed edge density
    pub density: f64,
}

/// Lower `cost[to]` to `candidate` if that improves it.
fn relax(
    cost: &mut HashMap<NodeIndex, f64>,
    previous: &mut HashMap<NodeIndex, NodeIndex>,
    from: NodeIndex,
    to: NodeIndex,
    candidate: f64,
) -> bool {
    if cost.get(&to).is_none_or(|known| candidate < *known) {
        cost.insert(to, candidate);
        previous.insert(to, from);
        true
    } else {
        false
    }
}

/// Whether `node` already lies on the recorded route ending at `tail`.
fn on_route(previous: &HashMap<NodeIndex, NodeIndex>, tail: NodeIndex, node: NodeIndex) -> bool {
    let mut current = tail;
    let mut steps = 0;
    loop {
        if current == node {
            return true;
        }
        match previous.get(&current) {
            Some(&prior) if steps <= previous.len() => {
                current = prior;
                steps += 1;
            }
            _ => return false,
        }
    }
}

/// In-memory copy of a dependency network.
#[derive(Debug, Clone)]
pub struct NetworkSnapshot {
    graph: DiGraph<Node, DependencyEdge>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl NetworkSnapshot {
    /// Build a snapshot. Inactive edges and edges with an endpoint outside
    /// `nodes` are dropped.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<DependencyEdge>) -> Self {
        let mut nodes = nodes;
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes.dedup_by(|a, b| a.id == b.id);

        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut node_map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            node_map.insert(id, graph.add_node(node));
        }

        let mut edges = edges;
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        for edge in edges.into_iter().filter(DependencyEdge::is_active) {
            if let (Some(&from), Some(&to)) =
                (node_map.get(&edge.predecessor), node_map.get(&edge.successor))
            {
                graph.add_edge(from, to, edge);
            }
        }
        Self { graph, node_map }
    }

    /// Nodes in the snapshot
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Edges in the snapshot
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the snapshot holds `id`
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    fn id(&self, index: NodeIndex) -> &NodeId {
        &self.graph[index].id
    }

    /// Topological level of every node.
    ///
    /// Nodes with no remaining predecessors are peeled off one layer at a
    /// time. If peeling stalls on a cycle, every remaining node gets the
    /// current level and peeling stops.
    #[must_use]
    pub fn levels(&self) -> BTreeMap<NodeId, usize> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|i| (i, self.graph.edges_directed(i, Direction::Incoming).count()))
            .collect();
        let mut levels = BTreeMap::new();
        let mut level = 0;

        while !in_degree.is_empty() {
            let layer: Vec<NodeIndex> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(index, _)| *index)
                .collect();

            if layer.is_empty() {
                tracing::warn!(
                    remaining = in_degree.len(),
                    level,
                    "Level peeling stalled on a cycle; assigning remaining nodes"
                );
                for index in in_degree.keys() {
                    levels.insert(self.id(*index).clone(), level);
                }
                break;
            }

            for index in &layer {
                in_degree.remove(index);
                levels.insert(self.id(*index).clone(), level);
                for next in self.graph.neighbors_directed(*index, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&next) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
            level += 1;
        }
        levels
    }

    /// Level of one node
    #[must_use]
    pub fn level(&self, id: &NodeId) -> Option<usize> {
        self.levels().get(id).copied()
    }

    /// Nodes with out-degree above 3, touched by a critical edge and not in
    /// a terminal status. Most connected first, ties by id.
    #[must_use]
    pub fn bottlenecks(&self) -> Vec<Bottleneck> {
        let mut found: Vec<Bottleneck> = self
            .graph
            .node_indices()
            .filter(|&i| !self.graph[i].status.is_terminal())
            .filter_map(|i| {
                let out_degree = self.graph.edges_directed(i, Direction::Outgoing).count();
                if out_degree <= BOTTLENECK_OUT_DEGREE {
                    return None;
                }
                let critical = self
                    .graph
                    .edges_directed(i, Direction::Outgoing)
                    .chain(self.graph.edges_directed(i, Direction::Incoming))
                    .any(|e| e.weight().is_critical);
                critical.then(|| Bottleneck {
                    node_id: self.id(i).clone(),
                    out_degree,
                    in_degree: self.graph.edges_directed(i, Direction::Incoming).count(),
                })
            })
            .collect();
        found.sort_by(|a, b| {
            (b.out_degree + b.in_degree)
                .cmp(&(a.out_degree + a.in_degree))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        found
    }

    /// Cycle groups: strongly connected components with more than one node,
    /// each sorted by id, ordered by their first id.
    #[must_use]
    pub fn strongly_connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut components: Vec<Vec<NodeId>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut ids: Vec<NodeId> =
                    component.into_iter().map(|i| self.id(i).clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        components.sort();
        components
    }

    /// Mean local clustering coefficient over nodes with two or more
    /// neighbours, treating edges as undirected. 0 when no node qualifies.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn clustering_coefficient(&self) -> f64 {
        let neighbours: HashMap<NodeIndex, HashSet<NodeIndex>> = self
            .graph
            .node_indices()
            .map(|i| {
                let set = self
                    .graph
                    .neighbors_undirected(i)
                    .filter(|&n| n != i)
                    .collect();
                (i, set)
            })
            .collect();

        let mut total = 0.0;
        let mut counted = 0usize;
        for (index, around) in &neighbours {
            let k = around.len();
            if k < 2 {
                continue;
            }
            let around: Vec<&NodeIndex> = around.iter().collect();
            let mut links = 0usize;
            for (pos, a) in around.iter().enumerate() {
                for b in &around[pos + 1..] {
                    if neighbours.get(*a).is_some_and(|set| set.contains(*b)) {
                        links += 1;
                    }
                }
            }
            let possible = k * (k - 1) / 2;
            total += links as f64 / possible as f64;
            counted += 1;
            tracing::trace!(node = %self.id(*index), k, links, "Local clustering");
        }

        if counted == 0 { 0.0 } else { total / counted as f64 }
    }

    /// Edges present over edges possible in a directed graph without self loops
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn density(&self) -> f64 {
        let n = self.node_count();
        if n < 2 {
            return 0.0;
        }
        self.edge_count() as f64 / (n * (n - 1)) as f64
    }

    /// Most critical route from `from` to `to`.
    ///
    /// Lowest total path cost, where lag adds cost and criticality or impact
    /// subtracts it. Costs can be negative, so an acyclic network is relaxed
    /// once in topological order. A network with a cycle falls back to
    /// Bellman-Ford capped at `node_count - 1` rounds that only extends
    /// simple routes. Empty when either end is missing or `to` is
    /// unreachable.
    #[must_use]
    pub fn critical_path_between(&self, from: &NodeId, to: &NodeId) -> Vec<NodeId> {
        let (Some(&start), Some(&goal)) = (self.node_map.get(from), self.node_map.get(to)) else {
            return Vec::new();
        };

        let mut cost: HashMap<NodeIndex, f64> = HashMap::from([(start, 0.0)]);
        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        if let Ok(order) = toposort(&self.graph, None) {
            for index in order {
                let Some(&here) = cost.get(&index) else {
                    continue;
                };
                for edge in self.graph.edges_directed(index, Direction::Outgoing) {
                    let candidate = here + path_cost(edge.weight());
                    relax(&mut cost, &mut previous, index, edge.target(), candidate);
                }
            }
        } else {
            tracing::warn!(
                from = %from,
                to = %to,
                "Route search over a cyclic network; relaxation rounds capped"
            );
            for _ in 1..self.node_count() {
                let mut changed = false;
                for edge in self.graph.edge_references() {
                    if edge.target() == start {
                        continue;
                    }
                    let Some(&here) = cost.get(&edge.source()) else {
                        continue;
                    };
                    // Keep every route simple: never hang a node below itself
                    if on_route(&previous, edge.source(), edge.target()) {
                        continue;
                    }
                    let candidate = here + path_cost(edge.weight());
                    changed |=
                        relax(&mut cost, &mut previous, edge.source(), edge.target(), candidate);
                }
                if !changed {
                    break;
                }
            }
        }

        if !cost.contains_key(&goal) {
            return Vec::new();
        }
        let mut path = vec![goal];
        let mut visited = HashSet::from([goal]);
        let mut current = goal;
        while current != start {
            let Some(&prior) = previous.get(&current) else {
                return Vec::new();
            };
            if !visited.insert(prior) {
                return Vec::new();
            }
            path.push(prior);
            current = prior;
        }
        path.reverse();
        path.into_iter().map(|i| self.id(i).clone()).collect()
    }

    /// Everything above in one record
    #[must_use]
    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            max_level: self.levels().values().copied().max(),
            bottlenecks: self.bottlenecks(),
            cycles: self.strongly_connected_components(),
            clustering_coefficient: self.clustering_coefficient(),
            density: self.density(),
        }
    }
}

/// Builds [`NetworkSnapshot`]s from the stores.
#[derive(Clone)]
pub struct NetworkAnalyzer {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    max_depth: usize,
}

impl NetworkAnalyzer {
    /// Create an analyzer over the given collaborators
    pub fn new(nodes: Arc<dyn NodeProvider>, store: Arc<dyn GraphStore>, max_depth: usize) -> Self {
        Self {
            nodes,
            store,
            max_depth,
        }
    }

    /// Snapshot of an explicit node set. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn snapshot(&self, ids: &[NodeId]) -> Result<NetworkSnapshot> {
        let nodes = self.nodes.get_nodes(ids).await?;
        let members: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

        let mut edges = Vec::new();
        for node in &nodes {
            edges.extend(
                self.store
                    .dependencies_from(&node.id)
                    .await?
                    .into_iter()
                    .filter(|edge| members.contains(&edge.successor)),
            );
        }
        Ok(NetworkSnapshot::new(nodes, edges))
    }

    /// Snapshot of `seed` and every node reachable from it upstream or
    /// downstream within the depth bound.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `seed` does not exist.
    pub async fn snapshot_from(&self, seed: &NodeId) -> Result<NetworkSnapshot> {
        if self.nodes.get_node(seed).await?.is_none() {
            return Err(Error::NodeNotFound(seed.clone()));
        }
        let mut ids = vec![seed.clone()];
        for direction in [TraversalDirection::Downstream, TraversalDirection::Upstream] {
            let reach = self
                .store
                .reachable(EdgeKind::Dependency, seed, direction, self.max_depth)
                .await?;
            if reach.truncated {
                tracing::warn!(node = %seed, ?direction, max_depth = self.max_depth, "Network snapshot hit the depth bound");
            }
            ids.extend(reach.ids());
        }
        ids.sort();
        ids.dedup();
        self.snapshot(&ids).await
    }

    /// Snapshot of every node held by the provider.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn snapshot_all(&self) -> Result<NetworkSnapshot> {
        let nodes = self.nodes.list_nodes(&NodeFilter::default()).await?;
        let edges = self.store.active_dependencies().await?;
        Ok(NetworkSnapshot::new(nodes, edges))
    }
}

impl std::fmt::Debug for NetworkAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkAnalyzer")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
