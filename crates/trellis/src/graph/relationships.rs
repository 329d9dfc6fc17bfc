//! Structural writes: hierarchy, program membership and master promotion.

use super::cycle::CycleValidator;
use super::gate::MutationGate;
use crate::analysis::AggregationEngine;
use crate::domain::{
    EdgeKind, MasterAggregate, Node, NodeId, RelationshipEdge, RelationshipMetadata,
    RelationshipType,
};
use crate::error::{Error, Result};
use crate::storage::{GraphStore, NodeProvider};
use std::sync::Arc;

const PARENT_CHILD: EdgeKind = EdgeKind::Relationship(RelationshipType::ParentChild);

/// Owns every write to `PARENT_CHILD`, `PROGRAM` and `MASTER` edges.
///
/// Hierarchy edits run the cycle check under the tenant's mutation gate and
/// refresh any master aggregate whose tree they touch.
#[derive(Clone)]
pub struct RelationshipManager {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    validator: CycleValidator,
    gate: Arc<MutationGate>,
    aggregation: Arc<AggregationEngine>,
}

impl RelationshipManager {
    /// Create a manager over the given collaborators
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        store: Arc<dyn GraphStore>,
        gate: Arc<MutationGate>,
        aggregation: Arc<AggregationEngine>,
        max_depth: usize,
    ) -> Self {
        Self {
            validator: CycleValidator::new(Arc::clone(&store), max_depth),
            nodes,
            store,
            gate,
            aggregation,
        }
    }

    async fn require_node(&self, id: &NodeId) -> Result<Node> {
        self.nodes
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    /// Both nodes, checked to live in the same tenant
    async fn same_tenant_pair(&self, anchor: &NodeId, other: &NodeId) -> Result<(Node, Node)> {
        let anchor = self.require_node(anchor).await?;
        let other = self.require_node(other).await?;
        if anchor.tenant_id != other.tenant_id {
            return Err(Error::CrossScope {
                node: other.id,
                expected: anchor.tenant_id,
                actual: other.tenant_id,
            });
        }
        Ok((anchor, other))
    }

    async fn single_link(
        &self,
        target: &NodeId,
        relationship_type: RelationshipType,
    ) -> Result<Option<RelationshipEdge>> {
        Ok(self
            .store
            .relationships_to(target, relationship_type)
            .await?
            .into_iter()
            .next())
    }

    fn metadata(actor: Option<&str>) -> RelationshipMetadata {
        RelationshipMetadata {
            created_by: actor.map(str::to_string),
            ..RelationshipMetadata::default()
        }
    }

    // ========== Hierarchy ==========

    /// Attach `child` under `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidRelationship` when `child == parent`
    /// - `NodeNotFound` when either node is missing
    /// - `CrossScope` when the parent belongs to another tenant
    /// - `MultipleParents` when the child already has an active parent
    /// - `CircularDependency` when the parent is already below the child
    pub async fn set_parent(
        &self,
        child: &NodeId,
        parent: &NodeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge> {
        if child == parent {
            return Err(Error::InvalidRelationship(format!(
                "node {child} cannot be its own parent"
            )));
        }
        let (child_node, _) = self.same_tenant_pair(child, parent).await?;

        let edge = {
            let _guard = self.gate.lock(&child_node.tenant_id).await;
            if let Some(existing) = self.single_link(child, RelationshipType::ParentChild).await? {
                return Err(Error::MultipleParents {
                    node: child.clone(),
                    existing: existing.source,
                    relationship: RelationshipType::ParentChild.to_string(),
                });
            }
            self.link_parent(child, parent, actor).await?
        };

        self.aggregation.refresh_masters_above(child).await;
        Ok(edge)
    }

    /// Cycle-check and insert `parent -> child`. Caller holds the gate.
    async fn link_parent(
        &self,
        child: &NodeId,
        parent: &NodeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge> {
        if self
            .validator
            .would_create_cycle(PARENT_CHILD, parent, child)
            .await?
        {
            return Err(Error::CircularDependency {
                from: parent.clone(),
                to: child.clone(),
            });
        }
        let edge = self
            .store
            .insert_relationship(
                parent,
                child,
                RelationshipType::ParentChild,
                Self::metadata(actor),
            )
            .await?;
        tracing::info!(edge = %edge.id, %parent, %child, "Linked child to parent");
        Ok(edge)
    }

    /// Move `child` under `new_parent`.
    ///
    /// The cycle check runs before the old link is touched, so a rejected
    /// move leaves the current parent in place.
    ///
    /// # Errors
    ///
    /// Same as [`set_parent`](Self::set_parent), minus `MultipleParents`.
    pub async fn move_node(
        &self,
        child: &NodeId,
        new_parent: &NodeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge> {
        if child == new_parent {
            return Err(Error::InvalidRelationship(format!(
                "node {child} cannot be its own parent"
            )));
        }
        let (child_node, _) = self.same_tenant_pair(child, new_parent).await?;

        let previous = {
            let _guard = self.gate.lock(&child_node.tenant_id).await;
            let current = self.single_link(child, RelationshipType::ParentChild).await?;
            if let Some(edge) = &current {
                if &edge.source == new_parent {
                    return Ok(edge.clone());
                }
            }

            // The child's own subtree is unaffected by the move, so checking
            // against the current graph is exact.
            if self
                .validator
                .would_create_cycle(PARENT_CHILD, new_parent, child)
                .await?
            {
                return Err(Error::CircularDependency {
                    from: new_parent.clone(),
                    to: child.clone(),
                });
            }
            let previous = match current {
                Some(edge) => {
                    self.store.deactivate_relationship(&edge.id, actor).await?;
                    Some(edge.source)
                }
                None => None,
            };
            let edge = self.link_parent(child, new_parent, actor).await?;
            (previous, edge)
        };

        let (old_parent, edge) = previous;
        if let Some(old_parent) = old_parent {
            self.aggregation.refresh_masters_above(&old_parent).await;
        }
        self.aggregation.refresh_masters_above(child).await;
        Ok(edge)
    }

    /// Detach `child` from its parent. Returns the deactivated edge, or
    /// `None` when the child was already a root.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `child` does not exist.
    pub async fn remove_parent(
        &self,
        child: &NodeId,
        actor: Option<&str>,
    ) -> Result<Option<RelationshipEdge>> {
        let child_node = self.require_node(child).await?;
        let removed = {
            let _guard = self.gate.lock(&child_node.tenant_id).await;
            match self.single_link(child, RelationshipType::ParentChild).await? {
                Some(edge) => Some(self.store.deactivate_relationship(&edge.id, actor).await?),
                None => None,
            }
        };
        if let Some(edge) = &removed {
            tracing::info!(edge = %edge.id, parent = %edge.source, %child, "Detached child");
            self.aggregation.refresh_masters_above(&edge.source).await;
        }
        Ok(removed)
    }

    // ========== Programs ==========

    /// Add `node` to `program`.
    ///
    /// # Errors
    ///
    /// - `InvalidRelationship` when `node == program`
    /// - `NodeNotFound` when either node is missing
    /// - `CrossScope` when they belong to different tenants
    /// - `MultipleParents` when the node already belongs to a program
    pub async fn assign_program(
        &self,
        node: &NodeId,
        program: &NodeId,
        actor: Option<&str>,
    ) -> Result<RelationshipEdge> {
        if node == program {
            return Err(Error::InvalidRelationship(format!(
                "node {node} cannot be a member of itself"
            )));
        }
        let (program_node, _) = self.same_tenant_pair(program, node).await?;

        let _guard = self.gate.lock(&program_node.tenant_id).await;
        if let Some(existing) = self.single_link(node, RelationshipType::Program).await? {
            return Err(Error::MultipleParents {
                node: node.clone(),
                existing: existing.source,
                relationship: RelationshipType::Program.to_string(),
            });
        }
        let edge = self
            .store
            .insert_relationship(program, node, RelationshipType::Program, Self::metadata(actor))
            .await?;
        tracing::info!(edge = %edge.id, %program, member = %node, "Assigned program member");
        Ok(edge)
    }

    /// Remove `node` from its program, if it has one.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `node` does not exist.
    pub async fn remove_from_program(
        &self,
        node: &NodeId,
        actor: Option<&str>,
    ) -> Result<Option<RelationshipEdge>> {
        let member = self.require_node(node).await?;
        let _guard = self.gate.lock(&member.tenant_id).await;
        match self.single_link(node, RelationshipType::Program).await? {
            Some(edge) => Ok(Some(self.store.deactivate_relationship(&edge.id, actor).await?)),
            None => Ok(None),
        }
    }

    /// Program `node` belongs to, if any.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `node` does not exist.
    pub async fn program_of(&self, node: &NodeId) -> Result<Option<NodeId>> {
        self.require_node(node).await?;
        Ok(self
            .single_link(node, RelationshipType::Program)
            .await?
            .map(|edge| edge.source))
    }

    /// Active members of `program`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `program` does not exist.
    pub async fn program_members(&self, program: &NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .aggregation
            .program_members(program)
            .await?
            .into_iter()
            .map(|node| node.id)
            .collect())
    }

    // ========== Masters ==========

    /// Promote `node` to master and compute its first aggregate.
    ///
    /// Promoting an existing master only refreshes its aggregate.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `node` does not exist.
    pub async fn promote_to_master(
        &self,
        node: &NodeId,
        actor: Option<&str>,
    ) -> Result<MasterAggregate> {
        let master = self.require_node(node).await?;
        {
            let _guard = self.gate.lock(&master.tenant_id).await;
            if self.single_link(node, RelationshipType::Master).await?.is_none() {
                let edge = self
                    .store
                    .insert_relationship(node, node, RelationshipType::Master, Self::metadata(actor))
                    .await?;
                tracing::info!(edge = %edge.id, master = %node, "Promoted to master");
            }
        }
        self.aggregation.refresh_master(node).await
    }

    /// Demote a master and discard its cached aggregate. Returns whether the
    /// node was a master.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `node` does not exist.
    pub async fn demote_master(&self, node: &NodeId, actor: Option<&str>) -> Result<bool> {
        let master = self.require_node(node).await?;
        let demoted = {
            let _guard = self.gate.lock(&master.tenant_id).await;
            match self.single_link(node, RelationshipType::Master).await? {
                Some(edge) => {
                    self.store.deactivate_relationship(&edge.id, actor).await?;
                    true
                }
                None => false,
            }
        };
        self.aggregation.discard_master(node).await;
        if demoted {
            tracing::info!(master = %node, "Demoted master");
        }
        Ok(demoted)
    }

    /// Ids of every active master, ordered by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn masters(&self) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self
            .store
            .active_relationships(RelationshipType::Master)
            .await?
            .into_iter()
            .map(|edge| edge.source)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for RelationshipManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipManager")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}
