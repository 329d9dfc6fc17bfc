//! In-memory storage backend using HashMap and petgraph.
//!
//! Holds node snapshots and both edge families in RAM. All data is lost when
//! the process exits unless it is written out with [`save_to_jsonl`] and read
//! back with [`load_from_jsonl`].
//!
//! # Architecture
//!
//! - `HashMap<NodeId, Node>` for node snapshots
//! - `HashMap<EdgeId, RelationshipEdge>` and `HashMap<EdgeId, DependencyEdge>`
//!   for every edge ever written, active or not
//! - `petgraph::DiGraph` holding only the *active* edges of both families,
//!   each labelled with its [`EdgeKind`](crate::domain::EdgeKind), used for
//!   traversal queries
//! - `HashMap<NodeId, NodeIndex>` mapping ids to graph vertices
//!
//! ## Edge Direction
//!
//! Graph edges run the same way as the domain edges:
//!
//! - `PARENT_CHILD`: parent -> child
//! - `PROGRAM`: program -> member
//! - `MASTER`: node -> node (self loop)
//! - dependencies: predecessor -> successor
//!
//! # Thread Safety
//!
//! The inner state sits behind `Arc<tokio::sync::RwLock<_>>`. Reads share the
//! lock, writes take it exclusively, and every trait method holds it for the
//! duration of a single call only.

mod graph;
mod inner;
mod jsonl;
mod trait_impl;

use crate::domain::{Node, NodeId};
use inner::InMemoryStoreInner;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use jsonl::{
    DEPENDENCIES_FILE, LoadWarning, NODES_FILE, RELATIONSHIPS_FILE, load_from_jsonl, save_to_jsonl,
};

/// Thread-safe in-memory implementation of [`NodeProvider`](super::NodeProvider)
/// and [`GraphStore`](super::GraphStore).
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<InMemoryStoreInner>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node snapshot.
    ///
    /// Host systems own nodes; this is how they (and tests) feed snapshots in.
    pub async fn upsert_node(&self, node: Node) {
        let mut inner = self.inner.write().await;
        inner.ensure_vertex(&node.id);
        inner.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node snapshot.
    ///
    /// Edges touching the node are left in place; the engine reports them as
    /// dangling through `NodeNotFound` when it next reads them.
    pub async fn remove_node(&self, id: &NodeId) -> Option<Node> {
        self.inner.write().await.nodes.remove(id)
    }

    /// Number of node snapshots held
    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}
