//! Cycle detection for proposed edges.

use crate::domain::{EdgeKind, NodeId, RelationshipType};
use crate::error::Result;
use crate::storage::{GraphStore, TraversalDirection};
use std::sync::Arc;

/// Decides whether a proposed edge would close a loop.
///
/// Walks the active edges of the proposed edge's kind from its target and
/// reports a cycle iff the source is reachable. The walk is bounded by
/// `max_depth`; running out of depth is reported as "no cycle" with a
/// warning.
#[derive(Clone)]
pub struct CycleValidator {
    store: Arc<dyn GraphStore>,
    max_depth: usize,
}

impl CycleValidator {
    /// Create a validator over `store`
    pub fn new(store: Arc<dyn GraphStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// Hop bound used by the walk
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether adding `source -> target` to the `kind` subgraph creates a cycle.
    ///
    /// `MASTER` markers are self loops by construction and never count.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn would_create_cycle(
        &self,
        kind: EdgeKind,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<bool> {
        if kind == EdgeKind::Relationship(RelationshipType::Master) {
            return Ok(false);
        }
        if source == target {
            return Ok(true);
        }

        let reach = self
            .store
            .reachable(kind, target, TraversalDirection::Downstream, self.max_depth)
            .await?;

        if reach.contains(source) {
            tracing::debug!(%source, %target, %kind, "Proposed edge closes a cycle");
            return Ok(true);
        }
        if reach.truncated {
            tracing::warn!(
                %source,
                %target,
                %kind,
                max_depth = self.max_depth,
                "Cycle check hit the depth bound; treating as acyclic"
            );
        }
        Ok(false)
    }
}

impl std::fmt::Debug for CycleValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleValidator")
            .field("max_depth", &self.max_depth)
            .field("store", &"<dyn GraphStore>")
            .finish()
    }
}
