//! `NodeProvider` and `GraphStore` implementations for [`InMemoryStore`].

use super::InMemoryStore;
use super::graph::reachable_impl;
use crate::domain::{
    DependencyEdge, DependencyMetadata, DependencyStatus, DependencyUpdate, EdgeId, EdgeKind, NewDependency, Node,
    NodeFilter, NodeId, RelationshipEdge, RelationshipMetadata, RelationshipType,
};
use crate::error::{Error, Result};
use crate::id_generation::EdgePrefix;
use crate::storage::{GraphStore, NodeProvider, Reachability, TraversalDirection};
use async_trait::async_trait;
use chrono::Utc;

fn sorted_by_id<T>(mut edges: Vec<T>, id: impl Fn(&T) -> &EdgeId) -> Vec<T> {
    edges.sort_by(|a, b| id(a).cmp(id(b)));
    edges
}

#[async_trait]
impl NodeProvider for InMemoryStore {
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect())
    }

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let inner = self.inner.read().await;
        let mut nodes: Vec<Node> = inner
            .nodes
            .values()
            .filter(|node| filter.matches(node))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = filter.limit {
            nodes.truncate(limit);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    // ========== Relationships ==========

    async fn insert_relationship(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship_type: RelationshipType,
        metadata: RelationshipMetadata,
    ) -> Result<RelationshipEdge> {
        let mut inner = self.inner.write().await;
        let id = inner.id_generator.generate(
            EdgePrefix::Relationship,
            source.as_str(),
            target.as_str(),
            &relationship_type.to_string(),
        )?;

        let edge = RelationshipEdge {
            id,
            source: source.clone(),
            target: target.clone(),
            relationship_type,
            is_active: true,
            metadata,
            created_at: Utc::now(),
            deactivated_at: None,
        };
        inner.put_relationship(edge.clone());

        tracing::debug!(edge = %edge.id, %source, %target, kind = %relationship_type, "Inserted relationship");
        Ok(edge)
    }

    async fn deactivate_relationship(
        &self,
        id: &EdgeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge> {
        let mut inner = self.inner.write().await;
        let edge = inner
            .relationships
            .get_mut(id)
            .ok_or_else(|| Error::EdgeNotFound(id.clone()))?;

        let was_active = edge.is_active;
        edge.deactivate(actor, Utc::now());
        let edge = edge.clone();

        if was_active {
            inner.unlink(&edge.source, &edge.target, id);
            tracing::debug!(edge = %id, "Deactivated relationship");
        }
        Ok(edge)
    }

    async fn get_relationship(&self, id: &EdgeId) -> Result<Option<RelationshipEdge>> {
        Ok(self.inner.read().await.relationships.get(id).cloned())
    }

    async fn relationships_from(
        &self,
        source: &NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .relationships
            .values()
            .filter(|e| e.is_active && e.relationship_type == relationship_type && &e.source == source)
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    async fn relationships_to(
        &self,
        target: &NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .relationships
            .values()
            .filter(|e| e.is_active && e.relationship_type == relationship_type && &e.target == target)
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    async fn active_relationships(
        &self,
        relationship_type: RelationshipType,
    ) -> Result<Vec<RelationshipEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .relationships
            .values()
            .filter(|e| e.is_active && e.relationship_type == relationship_type)
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    // ========== Dependencies ==========

    async fn insert_dependency(
        &self,
        dependency: NewDependency,
        actor: Option<&str>,
    ) -> Result<DependencyEdge> {
        let mut inner = self.inner.write().await;

        // Uniqueness is checked under the write lock, so racing inserts for
        // the same pair cannot both succeed
        if inner
            .active_pair(&dependency.predecessor, &dependency.successor)
            .is_some()
        {
            return Err(Error::DuplicateEdge {
                predecessor: dependency.predecessor,
                successor: dependency.successor,
            });
        }

        let id = inner.id_generator.generate(
            EdgePrefix::Dependency,
            dependency.predecessor.as_str(),
            dependency.successor.as_str(),
            &dependency.dependency_type.to_string(),
        )?;
        let now = Utc::now();
        let edge = DependencyEdge {
            id,
            predecessor: dependency.predecessor,
            successor: dependency.successor,
            dependency_type: dependency.dependency_type,
            lag_days: dependency.lag_days,
            is_critical: dependency.is_critical,
            impact: dependency.impact,
            status: DependencyStatus::Active,
            metadata: DependencyMetadata {
                created_by: actor.map(str::to_string),
                note: dependency.note,
                ..DependencyMetadata::default()
            },
            created_at: now,
            updated_at: now,
        };
        inner.put_dependency(edge.clone());

        tracing::debug!(
            edge = %edge.id,
            predecessor = %edge.predecessor,
            successor = %edge.successor,
            "Inserted dependency"
        );
        Ok(edge)
    }

    async fn get_dependency(&self, id: &EdgeId) -> Result<Option<DependencyEdge>> {
        Ok(self.inner.read().await.dependencies.get(id).cloned())
    }

    async fn find_dependency(
        &self,
        predecessor: &NodeId,
        successor: &NodeId,
    ) -> Result<Option<DependencyEdge>> {
        Ok(self
            .inner
            .read()
            .await
            .active_pair(predecessor, successor)
            .cloned())
    }

    async fn update_dependency(
        &self,
        id: &EdgeId,
        update: DependencyUpdate,
        actor: Option<&str>,
    ) -> Result<DependencyEdge> {
        let mut inner = self.inner.write().await;
        let current = inner
            .dependencies
            .get(id)
            .cloned()
            .ok_or_else(|| Error::EdgeNotFound(id.clone()))?;

        let mut updated = current.clone();
        update.apply(&mut updated, actor, Utc::now());

        if updated.is_active() && !current.is_active() {
            if let Some(other) = inner.active_pair(&updated.predecessor, &updated.successor) {
                if other.id != updated.id {
                    return Err(Error::DuplicateEdge {
                        predecessor: updated.predecessor,
                        successor: updated.successor,
                    });
                }
            }
        }

        match (current.is_active(), updated.is_active()) {
            (true, false) => inner.unlink(&current.predecessor, &current.successor, id),
            (false, true) => inner.link(
                &updated.predecessor,
                &updated.successor,
                id.clone(),
                EdgeKind::Dependency,
            ),
            _ => {}
        }
        inner.dependencies.insert(id.clone(), updated.clone());

        Ok(updated)
    }

    async fn delete_dependency(&self, id: &EdgeId) -> Result<DependencyEdge> {
        let mut inner = self.inner.write().await;
        let edge = inner
            .dependencies
            .remove(id)
            .ok_or_else(|| Error::EdgeNotFound(id.clone()))?;
        if edge.is_active() {
            inner.unlink(&edge.predecessor, &edge.successor, id);
        }
        tracing::debug!(edge = %id, "Deleted dependency");
        Ok(edge)
    }

    async fn dependencies_from(&self, predecessor: &NodeId) -> Result<Vec<DependencyEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .dependencies
            .values()
            .filter(|e| e.is_active() && &e.predecessor == predecessor)
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    async fn dependencies_to(&self, successor: &NodeId) -> Result<Vec<DependencyEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .dependencies
            .values()
            .filter(|e| e.is_active() && &e.successor == successor)
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    async fn active_dependencies(&self) -> Result<Vec<DependencyEdge>> {
        let inner = self.inner.read().await;
        let edges = inner
            .dependencies
            .values()
            .filter(|e| e.is_active())
            .cloned()
            .collect();
        Ok(sorted_by_id(edges, |e| &e.id))
    }

    // ========== Traversal ==========

    async fn reachable(
        &self,
        kind: EdgeKind,
        start: &NodeId,
        direction: TraversalDirection,
        max_depth: usize,
    ) -> Result<Reachability> {
        let inner = self.inner.read().await;
        Ok(reachable_impl(
            &inner.graph,
            &inner.node_map,
            kind,
            start,
            direction,
            max_depth,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencyType;

    async fn store_with(ids: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for id in ids {
            store.upsert_node(Node::new(*id, "t1", id.to_uppercase())).await;
        }
        store
    }

    #[tokio::test]
    async fn test_duplicate_pair_rejected() {
        let store = store_with(&["a", "b"]).await;
        let new = NewDependency::new("a", "b", DependencyType::FinishToStart);
        store.insert_dependency(new.clone(), None).await.unwrap();

        let err = store.insert_dependency(new, None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEdge { .. }));
    }

    #[tokio::test]
    async fn test_inactive_edge_leaves_traversal_graph() {
        let store = store_with(&["a", "b"]).await;
        let edge = store
            .insert_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
            .await
            .unwrap();

        let update = DependencyUpdate {
            status: Some(DependencyStatus::Inactive),
            ..DependencyUpdate::default()
        };
        store.update_dependency(&edge.id, update, Some("ops")).await.unwrap();

        let reach = store
            .reachable(EdgeKind::Dependency, &NodeId::from("a"), TraversalDirection::Downstream, 5)
            .await
            .unwrap();
        assert!(reach.nodes.is_empty());
        assert!(store.active_dependencies().await.unwrap().is_empty());

        // The pair is free again
        store
            .insert_dependency(NewDependency::new("a", "b", DependencyType::StartToStart), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reactivation_clashes_with_newer_edge() {
        let store = store_with(&["a", "b"]).await;
        let old = store
            .insert_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
            .await
            .unwrap();
        store
            .update_dependency(
                &old.id,
                DependencyUpdate {
                    status: Some(DependencyStatus::Resolved),
                    ..DependencyUpdate::default()
                },
                None,
            )
            .await
            .unwrap();
        store
            .insert_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
            .await
            .unwrap();

        let err = store
            .update_dependency(
                &old.id,
                DependencyUpdate {
                    status: Some(DependencyStatus::Active),
                    ..DependencyUpdate::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEdge { .. }));
    }

    #[tokio::test]
    async fn test_deactivated_relationship_kept_for_audit() {
        let store = store_with(&["p", "c"]).await;
        let edge = store
            .insert_relationship(
                &NodeId::from("p"),
                &NodeId::from("c"),
                RelationshipType::ParentChild,
                RelationshipMetadata::default(),
            )
            .await
            .unwrap();

        store.deactivate_relationship(&edge.id, Some("alice")).await.unwrap();

        let stored = store.get_relationship(&edge.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.deactivated_at.is_some());
        assert!(store
            .relationships_to(&NodeId::from("c"), RelationshipType::ParentChild)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_dependency() {
        let store = InMemoryStore::new();
        let err = store.delete_dependency(&EdgeId::from("dep-nope")).await.unwrap_err();
        assert!(matches!(err, Error::EdgeNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_nodes_sorted_and_limited() {
        let store = store_with(&["c", "a", "b"]).await;
        let filter = NodeFilter {
            limit: Some(2),
            ..NodeFilter::default()
        };
        let ids: Vec<_> = store
            .list_nodes(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b")]);
    }
}
