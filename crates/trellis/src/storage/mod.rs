//! Storage abstraction layer for trellis.
//!
//! The engine never owns persistence. It talks to two collaborators:
//!
//! - [`NodeProvider`]: read access to work-item snapshots owned by the host.
//! - [`GraphStore`]: CRUD over relationship and dependency edges plus a raw
//!   "everything reachable within D hops" traversal query.
//!
//! Both traits are object safe and `Send + Sync`, and every method takes
//! `&self`, so a single `Arc<dyn GraphStore>` can be shared by interactive
//! callers and the background scheduler at the same time. Implementations
//! use interior mutability.
//!
//! [`in_memory::InMemoryStore`] implements both traits and can be loaded from
//! and saved to a JSONL dataset directory.
//!
//! # Example
//!
//! ```no_run
//! use trellis::domain::{DependencyType, NewDependency, Node};
//! use trellis::storage::in_memory::InMemoryStore;
//! use trellis::storage::GraphStore;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = InMemoryStore::new();
//!     store.upsert_node(Node::new("a", "acme", "Design")).await;
//!     store.upsert_node(Node::new("b", "acme", "Build")).await;
//!
//!     let edge = store
//!         .insert_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
//!         .await?;
//!     println!("Created {}", edge.id);
//!     Ok(())
//! }
//! ```

use crate::domain::{
    DependencyEdge, DependencyUpdate, EdgeId, EdgeKind, NewDependency, Node, NodeFilter, NodeId,
    RelationshipEdge, RelationshipMetadata, RelationshipType,
};
use crate::error::Result;
use async_trait::async_trait;

pub mod in_memory;

/// Direction of a traversal along directed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalDirection {
    /// Follow edges from source to target (children, successors)
    Downstream,

    /// Follow edges from target to source (parents, predecessors)
    Upstream,
}

impl From<TraversalDirection> for petgraph::Direction {
    fn from(direction: TraversalDirection) -> Self {
        match direction {
            TraversalDirection::Downstream => Self::Outgoing,
            TraversalDirection::Upstream => Self::Incoming,
        }
    }
}

/// Result of a depth-bounded reachability query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachability {
    /// Reached nodes with their hop distance from the start, start excluded,
    /// ordered by distance then id
    pub nodes: Vec<(NodeId, usize)>,

    /// True if unexplored edges remained at the depth bound
    pub truncated: bool,
}

impl Reachability {
    /// Whether `id` was reached
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|(node, _)| node == id)
    }

    /// Reached ids without depths
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Read access to work-item snapshots.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// Get a node by id. Returns `None` if it does not exist.
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>>;

    /// Batched lookup. Missing ids are skipped; order follows `ids`.
    async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>>;

    /// List nodes matching a filter, ordered by id.
    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>>;
}

/// Edge persistence and traversal.
///
/// # Method Categories
///
/// - **Relationships**: `insert_relationship`, `deactivate_relationship`,
///   `get_relationship`, `relationships_from`, `relationships_to`,
///   `active_relationships`
/// - **Dependencies**: `insert_dependency`, `get_dependency`,
///   `find_dependency`, `update_dependency`, `delete_dependency`,
///   `dependencies_from`, `dependencies_to`, `active_dependencies`
/// - **Traversal**: `reachable`
///
/// Listing methods return active edges only. Structural validation (cycles,
/// tenant scope, single parent) belongs to the engine; the store enforces
/// only the active ordered-pair uniqueness of dependency edges.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Relationships ==========

    /// Insert an active relationship edge.
    async fn insert_relationship(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: RelationshipType,
        metadata: RelationshipMetadata,
    ) -> Result<RelationshipEdge>;

    /// Soft-delete a relationship edge.
    ///
    /// # Errors
    ///
    /// Returns `Error::EdgeNotFound` if no edge has this id.
    async fn deactivate_relationship(
        &self,
        id: &EdgeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge>;

    /// Get a relationship edge (active or not) by id.
    async fn get_relationship(&self, id: &EdgeId) -> Result<Option<RelationshipEdge>>;

    /// Active edges of one type leaving `source`.
    async fn relationships_from(
        &self,
        source: &NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>>;

    /// Active edges of one type entering `target`.
    async fn relationships_to(
        &self,
        target: &NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>>;

    /// Every active edge of one type.
    async fn active_relationships(
        &self,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>>;

    // ========== Dependencies ==========

    /// Insert an active dependency edge.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateEdge` if an active edge already exists for
    /// the same ordered pair.
    async fn insert_dependency(
        &self,
        dependency: NewDependency,
        actor: Option<&str>,
    ) -> Result<DependencyEdge>;

    /// Get a dependency edge by id.
    async fn get_dependency(&self, id: &EdgeId) -> Result<Option<DependencyEdge>>;

    /// The active edge for an ordered pair, if any.
    async fn find_dependency(
        &self,
        predecessor: &NodeId,
        successor: &NodeId,
    ) -> Result<Option<DependencyEdge>>;

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `Error::EdgeNotFound` if no edge has this id, and
    /// `Error::DuplicateEdge` if reactivating it would clash with another
    /// active edge for the same pair.
    async fn update_dependency(
        &self,
        id: &EdgeId,
        update: DependencyUpdate,
        actor: Option<&str>,
    ) -> Result<DependencyEdge>;

    /// Remove a dependency edge and return it.
    ///
    /// # Errors
    ///
    /// Returns `Error::EdgeNotFound` if no edge has this id.
    async fn delete_dependency(&self, id: &EdgeId) -> Result<DependencyEdge>;

    /// Active edges where `predecessor` is the predecessor.
    async fn dependencies_from(&self, predecessor: &NodeId) -> Result<Vec<DependencyEdge>>;

    /// Active edges where `successor` is the successor.
    async fn dependencies_to(&self, successor: &NodeId) -> Result<Vec<DependencyEdge>>;

    /// Every active dependency edge.
    async fn active_dependencies(&self) -> Result<Vec<DependencyEdge>>;

    // ========== Traversal ==========

    /// All nodes reachable from `start` over active edges of `kind`, within
    /// `max_depth` hops.
    async fn reachable(
        &self,
        kind: EdgeKind,
        start: &NodeId,
        direction: TraversalDirection,
        max_depth: usize,
    ) -> Result<Reachability>;
}
