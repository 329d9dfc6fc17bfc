//! Queries over the `PARENT_CHILD` forest.

use crate::domain::{EdgeKind, NodeId, RelationshipType};
use crate::error::{Error, Result};
use crate::storage::{GraphStore, NodeProvider, Reachability, TraversalDirection};
use std::sync::Arc;

const PARENT_CHILD: EdgeKind = EdgeKind::Relationship(RelationshipType::ParentChild);

/// Ancestor, descendant and path queries over active `PARENT_CHILD` edges.
///
/// Results reflect the store at call time; nothing is cached. Every walk is
/// bounded by `max_depth` hops, so a cycle that slipped into the data still
/// terminates.
#[derive(Clone)]
pub struct HierarchyTraversal {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    max_depth: usize,
}

impl HierarchyTraversal {
    /// Create a traversal over the given collaborators
    pub fn new(nodes: Arc<dyn NodeProvider>, store: Arc<dyn GraphStore>, max_depth: usize) -> Self {
        Self {
            nodes,
            store,
            max_depth,
        }
    }

    async fn ensure_exists(&self, id: &NodeId) -> Result<()> {
        match self.nodes.get_node(id).await? {
            Some(_) => Ok(()),
            None => Err(Error::NodeNotFound(id.clone())),
        }
    }

    async fn walk(&self, id: &NodeId, direction: TraversalDirection) -> Result<Reachability> {
        let reach = self
            .store
            .reachable(PARENT_CHILD, id, direction, self.max_depth)
            .await?;
        if reach.truncated {
            tracing::warn!(
                node = %id,
                ?direction,
                max_depth = self.max_depth,
                "Hierarchy walk hit the depth bound"
            );
        }
        Ok(reach)
    }

    /// Active parent, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn parent(&self, id: &NodeId) -> Result<Option<NodeId>> {
        self.ensure_exists(id).await?;
        let edges = self.store.relationships_to(id, RelationshipType::ParentChild).await?;
        Ok(edges.into_iter().next().map(|edge| edge.source))
    }

    /// Direct children, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.ensure_exists(id).await?;
        let mut children: Vec<NodeId> = self
            .store
            .relationships_from(id, RelationshipType::ParentChild)
            .await?
            .into_iter()
            .map(|edge| edge.target)
            .collect();
        children.sort();
        Ok(children)
    }

    /// Ancestors, nearest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn ancestors(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.ensure_exists(id).await?;
        Ok(self.walk(id, TraversalDirection::Upstream).await?.ids())
    }

    /// Every descendant, breadth first.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn descendants(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.ensure_exists(id).await?;
        Ok(self.walk(id, TraversalDirection::Downstream).await?.ids())
    }

    /// Descendants with their depth below `id` and the truncation flag.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn descendant_reach(&self, id: &NodeId) -> Result<Reachability> {
        self.ensure_exists(id).await?;
        self.walk(id, TraversalDirection::Downstream).await
    }

    /// Other children of the same parent. Roots have no siblings.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn siblings(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let Some(parent) = self.parent(id).await? else {
            return Ok(Vec::new());
        };
        let mut siblings: Vec<NodeId> = self
            .store
            .relationships_from(&parent, RelationshipType::ParentChild)
            .await?
            .into_iter()
            .map(|edge| edge.target)
            .filter(|child| child != id)
            .collect();
        siblings.sort();
        Ok(siblings)
    }

    /// Number of ancestors; 0 for a root.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn depth(&self, id: &NodeId) -> Result<usize> {
        Ok(self.ancestors(id).await?.len())
    }

    /// Root-first path ending at `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if `id` does not exist.
    pub async fn path_from_root(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let mut path = self.ancestors(id).await?;
        path.reverse();
        path.push(id.clone());
        Ok(path)
    }
}

impl std::fmt::Debug for HierarchyTraversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyTraversal")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Node, RelationshipMetadata};
    use crate::storage::in_memory::InMemoryStore;

    //      root
    //     /    \
    //    a      b
    //    |
    //    c
    async fn tree() -> (Arc<InMemoryStore>, HierarchyTraversal) {
        let store = Arc::new(InMemoryStore::new());
        for id in ["root", "a", "b", "c"] {
            store.upsert_node(Node::new(id, "t1", id)).await;
        }
        for (parent, child) in [("root", "a"), ("root", "b"), ("a", "c")] {
            store
                .insert_relationship(
                    &NodeId::from(parent),
                    &NodeId::from(child),
                    RelationshipType::ParentChild,
                    RelationshipMetadata::default(),
                )
                .await
                .unwrap();
        }
        let traversal = HierarchyTraversal::new(store.clone(), store.clone(), 20);
        (store, traversal)
    }

    #[tokio::test]
    async fn test_ancestors_nearest_first() {
        let (_, h) = tree().await;
        assert_eq!(
            h.ancestors(&NodeId::from("c")).await.unwrap(),
            vec![NodeId::from("a"), NodeId::from("root")]
        );
        assert_eq!(h.depth(&NodeId::from("c")).await.unwrap(), 2);
        assert_eq!(h.depth(&NodeId::from("root")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_path_from_root() {
        let (_, h) = tree().await;
        assert_eq!(
            h.path_from_root(&NodeId::from("c")).await.unwrap(),
            vec![NodeId::from("root"), NodeId::from("a"), NodeId::from("c")]
        );
    }

    #[tokio::test]
    async fn test_descendants_and_siblings() {
        let (_, h) = tree().await;
        let mut descendants = h.descendants(&NodeId::from("root")).await.unwrap();
        descendants.sort();
        assert_eq!(
            descendants,
            vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("c")]
        );
        assert_eq!(
            h.siblings(&NodeId::from("a")).await.unwrap(),
            vec![NodeId::from("b")]
        );
        assert!(h.siblings(&NodeId::from("root")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_node() {
        let (_, h) = tree().await;
        let err = h.ancestors(&NodeId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_depth_terminates_on_cycle() {
        let (store, h) = tree().await;
        // Malformed data: c becomes root's parent
        store
            .insert_relationship(
                &NodeId::from("c"),
                &NodeId::from("root"),
                RelationshipType::ParentChild,
                RelationshipMetadata::default(),
            )
            .await
            .unwrap();

        let path = h.path_from_root(&NodeId::from("c")).await.unwrap();
        assert_eq!(path.last(), Some(&NodeId::from("c")));
        assert!(path.len() <= 4);
    }
}
