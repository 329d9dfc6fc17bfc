//! Recursive roll-ups over the hierarchy and program membership.
//!
//! Budget and cost are plain sums over a root and every active
//! `PARENT_CHILD` descendant. Progress is budget weighted, with unbudgeted
//! nodes counting as weight 1. Inputs are always sorted by id before summing
//! so repeated passes over unchanged data produce bit-identical output.

use crate::clock::Clock;
use crate::domain::{MasterAggregate, Node, NodeId, NodeStatus, RelationshipType};
use crate::error::{Error, Result};
use crate::graph::HierarchyTraversal;
use crate::storage::{GraphStore, NodeProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// SPI once the schedule window has fully elapsed
const SPI_FLOOR: f64 = 0.5;

/// Variance and performance indices derived from a roll-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// `budget - cost`
    pub budget_variance: f64,
    /// `cost / budget`, 0 when there is no budget
    pub cost_performance_index: f64,
    /// 1.0 before the window, decaying linearly to 0.5 at its end
    pub schedule_performance_index: f64,
    /// `max(0, 100 - 100 * |cost - budget| / budget)`
    pub budget_health_score: f64,
    /// `(progress + budget_health_score) / 2`
    pub health_score: f64,
}

impl DerivedMetrics {
    fn compute(
        budget: f64,
        cost: f64,
        progress: f64,
        window: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
        now: DateTime<Utc>,
    ) -> Self {
        let budget_health_score = budget_health(budget, cost);
        Self {
            budget_variance: budget - cost,
            cost_performance_index: if budget > 0.0 { cost / budget } else { 0.0 },
            schedule_performance_index: schedule_performance(window.0, window.1, now),
            budget_health_score,
            health_score: (progress + budget_health_score) / 2.0,
        }
    }
}

fn budget_health(budget: f64, cost: f64) -> f64 {
    if budget > 0.0 {
        (100.0 - 100.0 * (cost - budget).abs() / budget).max(0.0)
    } else if cost > 0.0 {
        0.0
    } else {
        100.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn schedule_performance(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let (Some(start), Some(end)) = (start, end) else {
        return 1.0;
    };
    if now < start {
        return 1.0;
    }
    if now >= end {
        return SPI_FLOOR;
    }
    let total = (end - start).num_seconds() as f64;
    let elapsed = (now - start).num_seconds() as f64;
    1.0 - (1.0 - SPI_FLOOR) * (elapsed / total)
}

/// Budget-weighted progress, clamped to 0-100
fn weighted_progress(nodes: &[&Node]) -> f64 {
    let (weighted, weights) = nodes.iter().fold((0.0, 0.0), |(sum, total), node| {
        let weight = if node.budget > 0.0 { node.budget } else { 1.0 };
        (sum + weight * node.progress_percent, total + weight)
    });
    if weights > 0.0 {
        (weighted / weights).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn schedule_bounds(nodes: &[&Node]) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (
        nodes.iter().filter_map(|n| n.start_date).min(),
        nodes.iter().filter_map(|n| n.end_date).max(),
    )
}

/// Roll-up of a root and its hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupMetrics {
    /// Root of the roll-up
    pub root_id: NodeId,
    /// Summed budget, root included
    pub budget: f64,
    /// Summed actual cost, root included
    pub cost: f64,
    /// Budget-weighted progress
    pub progress: f64,
    /// Descendants, root excluded
    pub total_sub_nodes: usize,
    /// Descendants not in a terminal status
    pub active_sub_nodes: usize,
    /// Earliest planned start
    pub earliest_start: Option<DateTime<Utc>>,
    /// Latest planned end
    pub latest_end: Option<DateTime<Utc>>,
    /// Variance and indices
    pub derived: DerivedMetrics,
    /// Set when the descendant walk hit the depth bound
    pub truncated: bool,
}

impl RollupMetrics {
    /// Master record for this roll-up, stamped at `at`
    #[must_use]
    pub fn to_master_aggregate(&self, at: DateTime<Utc>) -> MasterAggregate {
        MasterAggregate {
            master_id: self.root_id.clone(),
            aggregated_budget: self.budget,
            aggregated_cost: self.cost,
            aggregated_progress: self.progress,
            total_sub_nodes: self.total_sub_nodes,
            active_sub_nodes: self.active_sub_nodes,
            earliest_start: self.earliest_start,
            latest_end: self.latest_end,
            last_aggregated_at: at,
        }
    }
}

/// Roll up `root` and its `descendants` as of `now`.
///
/// The result does not depend on the order of `descendants`.
#[must_use]
pub fn rollup(root: &Node, descendants: &[Node], now: DateTime<Utc>) -> RollupMetrics {
    let mut set: Vec<&Node> = descendants.iter().filter(|n| n.id != root.id).collect();
    set.sort_by(|a, b| a.id.cmp(&b.id));
    let total_sub_nodes = set.len();
    let active_sub_nodes = set.iter().filter(|n| !n.status.is_terminal()).count();
    set.insert(0, root);

    let budget: f64 = set.iter().map(|n| n.budget).sum();
    let cost: f64 = set.iter().map(|n| n.actual_cost).sum();
    let progress = weighted_progress(&set);
    let (earliest_start, latest_end) = schedule_bounds(&set);

    RollupMetrics {
        root_id: root.id.clone(),
        budget,
        cost,
        progress,
        total_sub_nodes,
        active_sub_nodes,
        earliest_start,
        latest_end,
        derived: DerivedMetrics::compute(budget, cost, progress, (earliest_start, latest_end), now),
        truncated: false,
    }
}

/// Figures for the members of one program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramMetrics {
    /// Program node
    pub program_id: NodeId,
    /// Active members
    pub member_count: usize,
    /// Members not in a terminal status
    pub active_members: usize,
    /// Members marked completed
    pub completed_members: usize,
    /// Members at risk or delayed
    pub at_risk_members: usize,
    /// Summed member budget
    pub budget: f64,
    /// Summed member cost
    pub cost: f64,
    /// Budget-weighted member progress
    pub progress: f64,
    /// Earliest member start
    pub earliest_start: Option<DateTime<Utc>>,
    /// Latest member end
    pub latest_end: Option<DateTime<Utc>>,
    /// Variance and indices
    pub derived: DerivedMetrics,
    /// When the figures were computed
    pub computed_at: DateTime<Utc>,
}

/// Roll-ups over hierarchies and programs, plus the master aggregate registry.
pub struct AggregationEngine {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    hierarchy: HierarchyTraversal,
    clock: Arc<dyn Clock>,
    masters: RwLock<HashMap<NodeId, MasterAggregate>>,
}

impl AggregationEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        store: Arc<dyn GraphStore>,
        clock: Arc<dyn Clock>,
        max_depth: usize,
    ) -> Self {
        Self {
            hierarchy: HierarchyTraversal::new(Arc::clone(&nodes), Arc::clone(&store), max_depth),
            nodes,
            store,
            clock,
            masters: RwLock::new(HashMap::new()),
        }
    }

    async fn require_node(&self, id: &NodeId) -> Result<Node> {
        self.nodes
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    /// Roll up `root` and every active descendant.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `root` does not exist.
    pub async fn aggregate(&self, root: &NodeId) -> Result<RollupMetrics> {
        let root_node = self.require_node(root).await?;
        let reach = self.hierarchy.descendant_reach(root).await?;
        let descendants = self.nodes.get_nodes(&reach.ids()).await?;
        if descendants.len() < reach.nodes.len() {
            tracing::debug!(
                root = %root,
                missing = reach.nodes.len() - descendants.len(),
                "Skipping descendants without a node snapshot"
            );
        }

        let mut metrics = rollup(&root_node, &descendants, self.clock.now());
        metrics.truncated = reach.truncated;
        Ok(metrics)
    }

    // ========== Masters ==========

    /// Recompute and store the aggregate for a master node.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `master` does not exist.
    pub async fn refresh_master(&self, master: &NodeId) -> Result<MasterAggregate> {
        let metrics = self.aggregate(master).await?;
        let aggregate = metrics.to_master_aggregate(self.clock.now());
        self.masters
            .write()
            .await
            .insert(master.clone(), aggregate.clone());
        tracing::debug!(
            master = %master,
            budget = aggregate.aggregated_budget,
            sub_nodes = aggregate.total_sub_nodes,
            "Refreshed master aggregate"
        );
        Ok(aggregate)
    }

    /// Last stored aggregate for a master, if any
    pub async fn master_aggregate(&self, master: &NodeId) -> Option<MasterAggregate> {
        self.masters.read().await.get(master).cloned()
    }

    /// Drop the stored aggregate for a master
    pub async fn discard_master(&self, master: &NodeId) -> Option<MasterAggregate> {
        self.masters.write().await.remove(master)
    }

    /// Refresh every stored master whose hierarchy contains `node`.
    ///
    /// Called after structural changes; failures are logged, not returned.
    pub async fn refresh_masters_above(&self, node: &NodeId) {
        let mut chain = match self.hierarchy.ancestors(node).await {
            Ok(ancestors) => ancestors,
            Err(error) => {
                tracing::debug!(node = %node, %error, "No hierarchy to refresh");
                return;
            }
        };
        chain.insert(0, node.clone());

        let tracked: Vec<NodeId> = {
            let masters = self.masters.read().await;
            chain.into_iter().filter(|id| masters.contains_key(id)).collect()
        };
        for master in tracked {
            if let Err(error) = self.refresh_master(&master).await {
                tracing::warn!(master = %master, %error, "Failed to refresh master aggregate");
            }
        }
    }

    // ========== Programs ==========

    /// Active members of a program, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `program` does not exist.
    pub async fn program_members(&self, program: &NodeId) -> Result<Vec<Node>> {
        self.require_node(program).await?;
        let mut ids: Vec<NodeId> = self
            .store
            .relationships_from(program, RelationshipType::Program)
            .await?
            .into_iter()
            .map(|edge| edge.target)
            .collect();
        ids.sort();
        self.nodes.get_nodes(&ids).await
    }

    /// Figures over the active members of a program.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `program` does not exist.
    pub async fn program_metrics(&self, program: &NodeId) -> Result<ProgramMetrics> {
        let mut members = self.program_members(program).await?;
        members.sort_by(|a, b| a.id.cmp(&b.id));
        let set: Vec<&Node> = members.iter().collect();
        let now = self.clock.now();

        let budget: f64 = set.iter().map(|n| n.budget).sum();
        let cost: f64 = set.iter().map(|n| n.actual_cost).sum();
        let progress = weighted_progress(&set);
        let (earliest_start, latest_end) = schedule_bounds(&set);

        Ok(ProgramMetrics {
            program_id: program.clone(),
            member_count: set.len(),
            active_members: set.iter().filter(|n| !n.status.is_terminal()).count(),
            completed_members: set
                .iter()
                .filter(|n| n.status == NodeStatus::Completed)
                .count(),
            at_risk_members: set
                .iter()
                .filter(|n| matches!(n.status, NodeStatus::AtRisk | NodeStatus::Delayed))
                .count(),
            budget,
            cost,
            progress,
            earliest_start,
            latest_end,
            derived: DerivedMetrics::compute(budget, cost, progress, (earliest_start, latest_end), now),
            computed_at: now,
        })
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("hierarchy", &self.hierarchy)
            .finish_non_exhaustive()
    }
}
