//! Core in-memory storage data structures.

use crate::domain::{DependencyEdge, EdgeId, EdgeKind, Node, NodeId, RelationshipEdge};
use crate::id_generation::EdgeIdGenerator;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Label carried by every active edge in the traversal graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GraphEdge {
    pub(crate) id: EdgeId,
    pub(crate) kind: EdgeKind,
}

/// Inner storage structure (not thread-safe).
///
/// The traversal graph mirrors exactly the active subset of
/// `relationships` and `dependencies`; inactive, resolved and deleted edges
/// are absent from it.
#[derive(Default)]
pub(crate) struct InMemoryStoreInner {
    /// Node snapshots indexed by id
    pub(super) nodes: HashMap<NodeId, Node>,

    /// Every relationship edge, active or soft-deleted
    pub(super) relationships: HashMap<EdgeId, RelationshipEdge>,

    /// Every dependency edge not hard-deleted
    pub(super) dependencies: HashMap<EdgeId, DependencyEdge>,

    /// Active edges of both families
    pub(super) graph: DiGraph<NodeId, GraphEdge>,

    /// Vertex lookup for `graph`
    pub(super) node_map: HashMap<NodeId, NodeIndex>,

    /// Collision-checked id source for new edges
    pub(super) id_generator: EdgeIdGenerator,
}

impl InMemoryStoreInner {
    /// Vertex for `id`, created on first use
    pub(super) fn ensure_vertex(&mut self, id: &NodeId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(id) {
            return index;
        }
        let index = self.graph.add_node(id.clone());
        self.node_map.insert(id.clone(), index);
        index
    }

    /// Add an active edge to the traversal graph
    pub(super) fn link(&mut self, source: &NodeId, target: &NodeId, id: EdgeId, kind: EdgeKind) {
        let from = self.ensure_vertex(source);
        let to = self.ensure_vertex(target);
        self.graph.add_edge(from, to, GraphEdge { id, kind });
    }

    /// Drop an edge from the traversal graph. Missing edges are ignored.
    pub(super) fn unlink(&mut self, source: &NodeId, target: &NodeId, id: &EdgeId) {
        let (Some(&from), Some(&to)) = (self.node_map.get(source), self.node_map.get(target))
        else {
            return;
        };
        let found = self
            .graph
            .edges_connecting(from, to)
            .find(|edge| &edge.weight().id == id)
            .map(|edge| edge.id());
        if let Some(edge_index) = found {
            self.graph.remove_edge(edge_index);
        }
    }

    /// Store a relationship record, linking it if active
    pub(super) fn put_relationship(&mut self, edge: RelationshipEdge) {
        if edge.is_active {
            self.link(
                &edge.source,
                &edge.target,
                edge.id.clone(),
                EdgeKind::Relationship(edge.relationship_type),
            );
        }
        self.id_generator.register(edge.id.clone());
        self.relationships.insert(edge.id.clone(), edge);
    }

    /// Store a dependency record, linking it if active
    pub(super) fn put_dependency(&mut self, edge: DependencyEdge) {
        if edge.is_active() {
            self.link(
                &edge.predecessor,
                &edge.successor,
                edge.id.clone(),
                EdgeKind::Dependency,
            );
        }
        self.id_generator.register(edge.id.clone());
        self.dependencies.insert(edge.id.clone(), edge);
    }

    /// The active dependency edge for an ordered pair
    pub(super) fn active_pair(
        &self,
        predecessor: &NodeId,
        successor: &NodeId,
    ) -> Option<&DependencyEdge> {
        self.dependencies.values().find(|edge| {
            edge.is_active() && &edge.predecessor == predecessor && &edge.successor == successor
        })
    }
}
