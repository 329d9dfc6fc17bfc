//! Predecessor/successor scheduling dependencies.
//!
//! [`DependencyGraphEngine`] owns every dependency write. Each write runs
//! under the tenant's [`MutationGate`] and is validated before it reaches
//! the store:
//!
//! 1. predecessor and successor differ (`SelfDependency`)
//! 2. lag within the configured bounds (`LagOutOfRange`)
//! 3. both nodes exist (`NodeNotFound`) and share a tenant (`CrossScope`)
//! 4. no active edge for the ordered pair (`DuplicateEdge`)
//! 5. no path back from successor to predecessor (`CircularDependency`)
//!
//! Read paths (critical path, cascading delay, impact analysis) work on
//! snapshots and never take the gate.

use super::cycle::CycleValidator;
use super::gate::MutationGate;
use crate::config::{DependencyConfig, EngineConfig};
use crate::domain::{
    DependencyEdge, DependencyStatus, DependencyUpdate, EdgeId, EdgeKind, NewDependency, Node,
    NodeId,
};
use crate::error::{Error, Result};
use crate::schedule::cpm::{self, CriticalPath};
use crate::storage::{GraphStore, NodeProvider, TraversalDirection};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Delay reaching one downstream node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDelay {
    /// Affected node
    pub node_id: NodeId,
    /// Largest delay in days over every path from the seed
    pub delay_days: f64,
    /// Hops from the seed along the path that produced the delay
    pub depth: usize,
}

/// Result of propagating a delay downstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeResult {
    /// Node the delay started at
    pub seed: NodeId,
    /// Initial delay in days
    pub initial_delay: f64,
    /// Affected nodes (seed excluded), ordered by depth then id
    pub delays: Vec<NodeDelay>,
    /// Set when propagation stopped at the depth bound
    pub truncated: bool,
}

impl CascadeResult {
    /// Delay computed for one node
    #[must_use]
    pub fn delay_of(&self, id: &NodeId) -> Option<f64> {
        self.delays
            .iter()
            .find(|d| &d.node_id == id)
            .map(|d| d.delay_days)
    }
}

/// Downstream node touched by a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactedNode {
    /// Affected node
    pub node_id: NodeId,
    /// Shortest hop distance from the source
    pub distance: usize,
    /// Reachable through critical edges only
    pub via_critical: bool,
}

/// Transitive successors of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactAnalysis {
    /// Node being changed
    pub source: NodeId,
    /// Every transitive successor, ordered by distance then id
    pub impacted: Vec<ImpactedNode>,
    /// Set when the walk stopped at the depth bound
    pub truncated: bool,
}

impl ImpactAnalysis {
    /// Ids reachable through critical edges only
    #[must_use]
    pub fn critical_subset(&self) -> Vec<NodeId> {
        self.impacted
            .iter()
            .filter(|n| n.via_critical)
            .map(|n| n.node_id.clone())
            .collect()
    }
}

/// CRUD-safe mutation and analysis of dependency edges.
#[derive(Clone)]
pub struct DependencyGraphEngine {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    validator: CycleValidator,
    gate: Arc<MutationGate>,
    limits: DependencyConfig,
    max_depth: usize,
    slack_tolerance: f64,
}

impl DependencyGraphEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        store: Arc<dyn GraphStore>,
        gate: Arc<MutationGate>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            validator: CycleValidator::new(Arc::clone(&store), config.traversal.max_depth),
            nodes,
            store,
            gate,
            limits: config.dependencies,
            max_depth: config.traversal.max_depth,
            slack_tolerance: config.schedule.slack_tolerance_days,
        }
    }

    async fn require_node(&self, id: &NodeId) -> Result<Node> {
        self.nodes
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    fn check_lag(&self, lag: i32) -> Result<()> {
        let (min, max) = (self.limits.min_lag_days, self.limits.max_lag_days);
        if (min..=max).contains(&lag) {
            Ok(())
        } else {
            Err(Error::LagOutOfRange { lag, min, max })
        }
    }

    // ========== Mutations ==========

    /// Create a dependency edge.
    ///
    /// # Errors
    ///
    /// - `SelfDependency` when both ends are the same node
    /// - `LagOutOfRange` when the lag is outside the configured bounds
    /// - `NodeNotFound` when either end is missing
    /// - `CrossScope` when the ends belong to different tenants
    /// - `DuplicateEdge` when the pair already has an active edge
    /// - `CircularDependency` when the successor already reaches the predecessor
    pub async fn create_dependency(
        &self,
        dependency: NewDependency,
        actor: Option<&str>,
    ) -> Result<DependencyEdge> {
        if dependency.predecessor == dependency.successor {
            return Err(Error::SelfDependency(dependency.predecessor));
        }
        self.check_lag(dependency.lag_days)?;

        let predecessor = self.require_node(&dependency.predecessor).await?;
        let successor = self.require_node(&dependency.successor).await?;
        if predecessor.tenant_id != successor.tenant_id {
            return Err(Error::CrossScope {
                node: successor.id,
                expected: predecessor.tenant_id,
                actual: successor.tenant_id,
            });
        }

        let _guard = self.gate.lock(&predecessor.tenant_id).await;

        if self
            .store
            .find_dependency(&dependency.predecessor, &dependency.successor)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateEdge {
                predecessor: dependency.predecessor,
                successor: dependency.successor,
            });
        }

        if self
            .validator
            .would_create_cycle(
                EdgeKind::Dependency,
                &dependency.predecessor,
                &dependency.successor,
            )
            .await?
        {
            return Err(Error::CircularDependency {
                from: dependency.predecessor,
                to: dependency.successor,
            });
        }

        let edge = self.store.insert_dependency(dependency, actor).await?;
        tracing::info!(
            edge = %edge.id,
            predecessor = %edge.predecessor,
            successor = %edge.successor,
            dependency_type = %edge.dependency_type,
            lag_days = edge.lag_days,
            "Created dependency"
        );
        Ok(edge)
    }

    /// Apply a partial update to a dependency edge.
    ///
    /// The acyclicity check is re-run when the type changes or the edge is
    /// switched back to active.
    ///
    /// # Errors
    ///
    /// - `EdgeNotFound` when no edge has this id
    /// - `LagOutOfRange` when a new lag is outside the bounds
    /// - `CircularDependency` when re-validation finds a loop
    pub async fn update_dependency(
        &self,
        id: &EdgeId,
        update: DependencyUpdate,
        actor: Option<&str>,
    ) -> Result<DependencyEdge> {
        let current = self.dependency(id).await?;
        if let Some(lag) = update.lag_days {
            self.check_lag(lag)?;
        }
        if update.is_empty() {
            return Ok(current);
        }

        let predecessor = self.require_node(&current.predecessor).await?;
        let _guard = self.gate.lock(&predecessor.tenant_id).await;

        let type_changed = update
            .dependency_type
            .is_some_and(|t| t != current.dependency_type);
        let reactivated =
            update.status == Some(DependencyStatus::Active) && !current.is_active();

        if type_changed || reactivated {
            if reactivated
                && self
                    .store
                    .find_dependency(&current.predecessor, &current.successor)
                    .await?
                    .is_some()
            {
                return Err(Error::DuplicateEdge {
                    predecessor: current.predecessor,
                    successor: current.successor,
                });
            }
            if self
                .validator
                .would_create_cycle(EdgeKind::Dependency, &current.predecessor, &current.successor)
                .await?
            {
                return Err(Error::CircularDependency {
                    from: current.predecessor,
                    to: current.successor,
                });
            }
        }

        let edge = self.store.update_dependency(id, update, actor).await?;
        tracing::info!(edge = %edge.id, "Updated dependency");
        Ok(edge)
    }

    /// Remove a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns `EdgeNotFound` when no edge has this id.
    pub async fn remove_dependency(&self, id: &EdgeId) -> Result<DependencyEdge> {
        let current = self.dependency(id).await?;
        let tenant = self
            .nodes
            .get_node(&current.predecessor)
            .await?
            .map(|node| node.tenant_id);

        let edge = match tenant {
            Some(tenant) => {
                let _guard = self.gate.lock(&tenant).await;
                self.store.delete_dependency(id).await?
            }
            // Dangling edge: nothing structural to protect
            None => self.store.delete_dependency(id).await?,
        };
        tracing::info!(edge = %edge.id, "Removed dependency");
        Ok(edge)
    }

    // ========== Lookups ==========

    /// Fetch a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns `EdgeNotFound` when no edge has this id.
    pub async fn dependency(&self, id: &EdgeId) -> Result<DependencyEdge> {
        self.store
            .get_dependency(id)
            .await?
            .ok_or_else(|| Error::EdgeNotFound(id.clone()))
    }

    /// Active edges into `id`.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `id` does not exist.
    pub async fn predecessors_of(&self, id: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.require_node(id).await?;
        self.store.dependencies_to(id).await
    }

    /// Active edges out of `id`.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `id` does not exist.
    pub async fn successors_of(&self, id: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.require_node(id).await?;
        self.store.dependencies_from(id).await
    }

    // ========== Analysis ==========

    /// Every node weakly connected to `id` through active dependencies,
    /// plus the edges among them.
    ///
    /// The walk is not depth bounded: CPM needs the whole network, and the
    /// visited set alone guarantees termination.
    async fn network_around(&self, id: &NodeId) -> Result<(Vec<Node>, Vec<DependencyEdge>)> {
        let mut seen: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut queue = VecDeque::from([id.clone()]);
        let mut edges: HashMap<EdgeId, DependencyEdge> = HashMap::new();

        while let Some(current) = queue.pop_front() {
            let mut touching = self.store.dependencies_from(&current).await?;
            touching.extend(self.store.dependencies_to(&current).await?);
            for edge in touching {
                let other = if edge.predecessor == current {
                    edge.successor.clone()
                } else {
                    edge.predecessor.clone()
                };
                if seen.insert(other.clone()) {
                    queue.push_back(other);
                }
                edges.insert(edge.id.clone(), edge);
            }
        }

        let mut ids: Vec<NodeId> = seen.into_iter().collect();
        ids.sort();
        let nodes = self.nodes.get_nodes(&ids).await?;
        let mut edges: Vec<DependencyEdge> = edges.into_values().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok((nodes, edges))
    }

    /// Critical path of the dependency network containing `id`.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `id` does not exist.
    pub async fn critical_path(&self, id: &NodeId) -> Result<CriticalPath> {
        self.require_node(id).await?;
        let (nodes, edges) = self.network_around(id).await?;
        let result = cpm::compute(&nodes, &edges, self.slack_tolerance);
        tracing::debug!(
            node = %id,
            network = nodes.len(),
            critical = result.critical_path.len(),
            duration = result.project_duration,
            "Computed critical path"
        );
        Ok(result)
    }

    /// Propagate a delay of `delay_days` from `id` to everything downstream.
    ///
    /// Breadth-first over active edges; each edge transforms the incoming
    /// delay by its type. A node keeps the largest delay seen on any path
    /// and is only re-expanded when that delay grows. Propagation stops where
    /// the delay drops to zero or the depth bound is reached.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` when `id` does not exist
    /// - `Validation` when the delay is negative or not finite
    pub async fn cascading_delay(&self, id: &NodeId, delay_days: f64) -> Result<CascadeResult> {
        if !delay_days.is_finite() || delay_days < 0.0 {
            return Err(Error::Validation(format!(
                "delay must be a non-negative number of days, got {delay_days}"
            )));
        }
        self.require_node(id).await?;

        let mut best: HashMap<NodeId, (f64, usize)> = HashMap::new();
        let mut queue = VecDeque::from([(id.clone(), delay_days, 0usize)]);
        let mut truncated = false;

        while let Some((current, delay, depth)) = queue.pop_front() {
            if delay <= 0.0 {
                continue;
            }
            for edge in self.store.dependencies_from(&current).await? {
                if &edge.successor == id {
                    continue;
                }
                if depth >= self.max_depth {
                    truncated = true;
                    continue;
                }
                let propagated = edge.dependency_type.propagate_delay(delay, edge.lag_days);
                let improves = best
                    .get(&edge.successor)
                    .is_none_or(|(recorded, _)| propagated > *recorded);
                if improves {
                    best.insert(edge.successor.clone(), (propagated, depth + 1));
                    queue.push_back((edge.successor, propagated, depth + 1));
                }
            }
        }
        if truncated {
            tracing::warn!(node = %id, max_depth = self.max_depth, "Delay cascade hit the depth bound");
        }

        let mut delays: Vec<NodeDelay> = best
            .into_iter()
            .map(|(node_id, (delay_days, depth))| NodeDelay {
                node_id,
                delay_days,
                depth,
            })
            .collect();
        delays.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.node_id.cmp(&b.node_id)));

        Ok(CascadeResult {
            seed: id.clone(),
            initial_delay: delay_days,
            delays,
            truncated,
        })
    }

    /// Everything downstream of `id`, and which of it hangs off critical edges.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `id` does not exist.
    pub async fn impact_analysis(&self, id: &NodeId) -> Result<ImpactAnalysis> {
        self.require_node(id).await?;
        let reach = self
            .store
            .reachable(
                EdgeKind::Dependency,
                id,
                TraversalDirection::Downstream,
                self.max_depth,
            )
            .await?;
        if reach.truncated {
            tracing::warn!(node = %id, max_depth = self.max_depth, "Impact walk hit the depth bound");
        }

        // Second walk restricted to critical edges
        let mut critical: HashSet<NodeId> = HashSet::new();
        let mut queue = VecDeque::from([(id.clone(), 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            for edge in self.store.dependencies_from(&current).await? {
                if edge.is_critical && &edge.successor != id && critical.insert(edge.successor.clone()) {
                    queue.push_back((edge.successor, depth + 1));
                }
            }
        }

        let impacted = reach
            .nodes
            .into_iter()
            .map(|(node_id, distance)| ImpactedNode {
                via_critical: critical.contains(&node_id),
                node_id,
                distance,
            })
            .collect();

        Ok(ImpactAnalysis {
            source: id.clone(),
            impacted,
            truncated: reach.truncated,
        })
    }
}

impl std::fmt::Debug for DependencyGraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraphEngine")
            .field("limits", &self.limits)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyType, Impact};
    use crate::error::ErrorKind;
    use crate::storage::in_memory::InMemoryStore;

    async fn engine(ids: &[&str]) -> (Arc<InMemoryStore>, DependencyGraphEngine) {
        let store = Arc::new(InMemoryStore::new());
        for id in ids {
            store.upsert_node(Node::new(*id, "t1", *id)).await;
        }
        let engine = DependencyGraphEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(MutationGate::new()),
            &EngineConfig::default(),
        );
        (store, engine)
    }

    fn fs(from: &str, to: &str) -> NewDependency {
        NewDependency::new(from, to, DependencyType::FinishToStart)
    }

    #[tokio::test]
    async fn test_reverse_edge_is_circular() {
        let (_, engine) = engine(&["a", "b"]).await;
        engine.create_dependency(fs("a", "b"), Some("alice")).await.unwrap();

        let err = engine.create_dependency(fs("b", "a"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (store, engine) = engine(&["a", "b"]).await;
        store.upsert_node(Node::new("x", "other", "X")).await;

        let err = engine.create_dependency(fs("a", "a"), None).await.unwrap_err();
        assert!(matches!(err, Error::SelfDependency(_)));

        let err = engine
            .create_dependency(fs("a", "b").with_lag(366), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LagOutOfRange { lag: 366, .. }));

        let err = engine.create_dependency(fs("a", "ghost"), None).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));

        let err = engine.create_dependency(fs("a", "x"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossScope);

        engine.create_dependency(fs("a", "b"), None).await.unwrap();
        let err = engine.create_dependency(fs("a", "b"), None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEdge { .. }));
    }

    #[tokio::test]
    async fn test_cascade_keeps_maximum() {
        // a -> b (FS, lag 2), a -> c (FS, lag 0), c -> b (FS, lag 5)
        let (_, engine) = engine(&["a", "b", "c"]).await;
        engine.create_dependency(fs("a", "b").with_lag(2), None).await.unwrap();
        engine.create_dependency(fs("a", "c"), None).await.unwrap();
        engine.create_dependency(fs("c", "b").with_lag(5), None).await.unwrap();

        let result = engine.cascading_delay(&NodeId::from("a"), 3.0).await.unwrap();
        assert_eq!(result.delay_of(&NodeId::from("c")), Some(3.0));
        assert_eq!(result.delay_of(&NodeId::from("b")), Some(8.0));
        assert!(result.delay_of(&NodeId::from("a")).is_none());
    }

    #[tokio::test]
    async fn test_cascade_stops_at_zero() {
        let (_, engine) = engine(&["a", "b", "c"]).await;
        engine
            .create_dependency(
                NewDependency::new("a", "b", DependencyType::StartToStart).with_lag(10),
                None,
            )
            .await
            .unwrap();
        engine.create_dependency(fs("b", "c"), None).await.unwrap();

        let result = engine.cascading_delay(&NodeId::from("a"), 4.0).await.unwrap();
        assert_eq!(result.delay_of(&NodeId::from("b")), Some(0.0));
        assert!(result.delay_of(&NodeId::from("c")).is_none());
    }

    #[tokio::test]
    async fn test_cascade_rejects_negative_delay() {
        let (_, engine) = engine(&["a"]).await;
        let err = engine.cascading_delay(&NodeId::from("a"), -1.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_type_change_and_reactivation() {
        let (_, engine) = engine(&["a", "b"]).await;
        let edge = engine.create_dependency(fs("a", "b"), None).await.unwrap();

        let updated = engine
            .update_dependency(
                &edge.id,
                DependencyUpdate {
                    dependency_type: Some(DependencyType::StartToStart),
                    status: Some(DependencyStatus::Inactive),
                    ..DependencyUpdate::default()
                },
                Some("bob"),
            )
            .await
            .unwrap();
        assert_eq!(updated.dependency_type, DependencyType::StartToStart);
        assert!(!updated.is_active());

        // While a -> b is inactive, b -> a is allowed
        let reverse = engine.create_dependency(fs("b", "a"), None).await.unwrap();

        // Reactivating a -> b would now close a loop
        let err = engine
            .update_dependency(
                &edge.id,
                DependencyUpdate {
                    status: Some(DependencyStatus::Active),
                    ..DependencyUpdate::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);

        engine.remove_dependency(&reverse.id).await.unwrap();
        let err = engine.dependency(&reverse.id).await.unwrap_err();
        assert!(matches!(err, Error::EdgeNotFound(_)));
    }

    #[tokio::test]
    async fn test_impact_analysis_marks_critical_chain() {
        let (_, engine) = engine(&["a", "b", "c", "d"]).await;
        engine
            .create_dependency(fs("a", "b").critical(Impact::High), None)
            .await
            .unwrap();
        engine
            .create_dependency(fs("b", "c").critical(Impact::Critical), None)
            .await
            .unwrap();
        engine.create_dependency(fs("a", "d"), None).await.unwrap();

        let analysis = engine.impact_analysis(&NodeId::from("a")).await.unwrap();
        assert_eq!(analysis.impacted.len(), 3);
        assert_eq!(
            analysis.critical_subset(),
            vec![NodeId::from("b"), NodeId::from("c")]
        );
        let c = analysis
            .impacted
            .iter()
            .find(|n| n.node_id == NodeId::from("c"))
            .unwrap();
        assert_eq!(c.distance, 2);
    }

    #[tokio::test]
    async fn test_predecessors_and_successors_are_direct() {
        let (_, engine) = engine(&["a", "b", "c"]).await;
        engine.create_dependency(fs("a", "b"), None).await.unwrap();
        engine.create_dependency(fs("b", "c"), None).await.unwrap();

        let preds = engine.predecessors_of(&NodeId::from("c")).await.unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].predecessor, NodeId::from("b"));
        let succs = engine.successors_of(&NodeId::from("a")).await.unwrap();
        assert_eq!(succs.len(), 1);
    }
}
