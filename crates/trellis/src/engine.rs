//! Wiring of every engine component over one pair of stores.
//!
//! [`Engine`] owns a single [`MutationGate`] shared by the dependency engine
//! and the relationship manager, so every structural write in a tenant is
//! serialized no matter which entry point it comes through.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis::clock::SystemClock;
//! use trellis::config::EngineConfig;
//! use trellis::domain::{DependencyType, NewDependency, Node};
//! use trellis::engine::Engine;
//! use trellis::scheduler::TracingNotifier;
//! use trellis::storage::in_memory::InMemoryStore;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = InMemoryStore::new();
//!     store.upsert_node(Node::new("a", "acme", "Design")).await;
//!     store.upsert_node(Node::new("b", "acme", "Build")).await;
//!
//!     let shared = Arc::new(store);
//!     let engine = Engine::new(
//!         shared.clone(),
//!         shared,
//!         EngineConfig::default(),
//!         Arc::new(SystemClock),
//!         Arc::new(TracingNotifier),
//!     )?;
//!
//!     engine
//!         .dependencies()
//!         .create_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
//!         .await?;
//!     let path = engine.dependencies().critical_path(&"a".into()).await?;
//!     println!("{:?}", path.critical_path);
//!     Ok(())
//! }
//! ```

use crate::analysis::{AggregationEngine, HealthScorer, NetworkAnalyzer};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{
    CycleValidator, DependencyGraphEngine, HierarchyTraversal, MutationGate, RelationshipManager,
};
use crate::scheduler::{Notifier, RecomputeScheduler};
use crate::storage::{GraphStore, NodeProvider};
use std::sync::Arc;

/// Every engine component, built once and shared.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    validator: CycleValidator,
    hierarchy: HierarchyTraversal,
    dependencies: DependencyGraphEngine,
    relationships: RelationshipManager,
    network: NetworkAnalyzer,
    aggregation: Arc<AggregationEngine>,
    health: Arc<HealthScorer>,
    scheduler: RecomputeScheduler,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("stores", &"<dyn NodeProvider + dyn GraphStore>")
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` holds out-of-range values.
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        store: Arc<dyn GraphStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let max_depth = config.traversal.max_depth;
        let gate = Arc::new(MutationGate::new());

        let aggregation = Arc::new(AggregationEngine::new(
            Arc::clone(&nodes),
            Arc::clone(&store),
            Arc::clone(&clock),
            max_depth,
        ));
        let health = Arc::new(HealthScorer::new(
            Arc::clone(&nodes),
            Arc::clone(&aggregation),
            Arc::clone(&clock),
        ));
        let scheduler = RecomputeScheduler::new(
            Arc::clone(&nodes),
            Arc::clone(&store),
            Arc::clone(&aggregation),
            Arc::clone(&health),
            notifier,
            Arc::clone(&clock),
            config.scheduler,
            config.health,
        );

        Ok(Self {
            validator: CycleValidator::new(Arc::clone(&store), max_depth),
            hierarchy: HierarchyTraversal::new(Arc::clone(&nodes), Arc::clone(&store), max_depth),
            dependencies: DependencyGraphEngine::new(
                Arc::clone(&nodes),
                Arc::clone(&store),
                Arc::clone(&gate),
                &config,
            ),
            relationships: RelationshipManager::new(
                Arc::clone(&nodes),
                Arc::clone(&store),
                gate,
                Arc::clone(&aggregation),
                max_depth,
            ),
            network: NetworkAnalyzer::new(nodes, store, max_depth),
            aggregation,
            health,
            scheduler,
            clock,
            config,
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Time source shared by every component
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cycle checks without mutation
    #[must_use]
    pub fn validator(&self) -> &CycleValidator {
        &self.validator
    }

    /// Hierarchy queries
    #[must_use]
    pub fn hierarchy(&self) -> &HierarchyTraversal {
        &self.hierarchy
    }

    /// Dependency writes, critical path, cascade and impact
    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraphEngine {
        &self.dependencies
    }

    /// Parent, program and master writes
    #[must_use]
    pub fn relationships(&self) -> &RelationshipManager {
        &self.relationships
    }

    /// Network structure analysis
    #[must_use]
    pub fn network(&self) -> &NetworkAnalyzer {
        &self.network
    }

    /// Roll-ups and master aggregates
    #[must_use]
    pub fn aggregation(&self) -> &AggregationEngine {
        &self.aggregation
    }

    /// Health scoring
    #[must_use]
    pub fn health(&self) -> &HealthScorer {
        &self.health
    }

    /// Background recomputation
    #[must_use]
    pub fn scheduler(&self) -> &RecomputeScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TraversalConfig;
    use crate::domain::{DependencyType, EdgeKind, NewDependency, Node, NodeId};
    use crate::error::{Error, ErrorKind};
    use crate::scheduler::TracingNotifier;
    use crate::storage::in_memory::InMemoryStore;
    use chrono::{TimeZone, Utc};

    async fn engine_with(ids: &[&str], config: EngineConfig) -> Result<Engine> {
        let store = InMemoryStore::new();
        for id in ids {
            store.upsert_node(Node::new(*id, "t1", *id)).await;
        }
        let shared = Arc::new(store);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        Engine::new(
            shared.clone(),
            shared,
            config,
            Arc::new(clock),
            Arc::new(TracingNotifier),
        )
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = EngineConfig {
            traversal: TraversalConfig { max_depth: 0 },
            ..EngineConfig::default()
        };
        let error = engine_with(&[], config).await.unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_components_share_stores() {
        let engine = engine_with(&["a", "b"], EngineConfig::default()).await.unwrap();
        engine
            .dependencies()
            .create_dependency(NewDependency::new("a", "b", DependencyType::FinishToStart), None)
            .await
            .unwrap();

        let closes = engine
            .validator()
            .would_create_cycle(EdgeKind::Dependency, &NodeId::from("b"), &NodeId::from("a"))
            .await
            .unwrap();
        assert!(closes);

        let error = engine
            .relationships()
            .set_parent(&NodeId::from("a"), &NodeId::from("a"), None)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }
}
