//! Work-item snapshots and the derived master aggregate.

use super::{NodeId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for `progress_percent`
pub const MAX_PROGRESS: f64 = 100.0;

/// Lifecycle status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not started yet
    Planning,

    /// Work is underway
    Active,

    /// Paused by the owner
    OnHold,

    /// Running behind its schedule
    Delayed,

    /// Flagged as likely to miss its targets
    AtRisk,

    /// Finished
    Completed,

    /// Abandoned
    Cancelled,
}

impl NodeStatus {
    /// Terminal statuses never change again and are skipped by bottleneck and
    /// recompute passes.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses where work is currently in flight.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Active | Self::Delayed | Self::AtRisk)
    }
}

/// Business priority of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Backlog-level priority
    Low,

    /// Default priority
    Medium,

    /// Important
    High,

    /// Business critical
    Critical,
}

impl Priority {
    /// Weight multiplier used by the portfolio health aggregate
    #[must_use]
    pub fn weight_multiplier(self) -> f64 {
        match self {
            Self::Critical => 3.0,
            Self::High => 2.0,
            Self::Medium => 1.5,
            Self::Low => 1.0,
        }
    }
}

/// Direction of a team's delivery velocity over recent iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    /// Velocity is rising
    Improving,
    /// Velocity is flat
    Stable,
    /// Velocity is falling
    Declining,
}

/// Externally supplied quality indicators.
///
/// Every field is optional; an absent indicator leaves the quality baseline
/// untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityIndicators {
    /// Defects per delivered unit, as a percentage (0-100)
    pub defect_rate: Option<f64>,

    /// Automated test coverage percentage (0-100)
    pub test_coverage: Option<f64>,

    /// Customer satisfaction on a 1-5 scale
    pub customer_satisfaction: Option<f64>,
}

/// Externally supplied team indicators.
///
/// Every field is optional; an absent indicator leaves the team baseline
/// untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamIndicators {
    /// Team satisfaction on a 1-10 scale
    pub satisfaction: Option<f64>,

    /// Number of people on the team
    pub team_size: Option<u32>,

    /// Annualized turnover percentage (0-100)
    pub turnover_rate: Option<f64>,

    /// Velocity trend over recent iterations
    pub velocity_trend: Option<VelocityTrend>,
}

/// Read-mostly snapshot of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Display name
    pub name: String,

    /// Planned budget
    #[serde(default)]
    pub budget: f64,

    /// Cost incurred so far
    #[serde(default)]
    pub actual_cost: f64,

    /// Completion percentage (0-100)
    #[serde(default)]
    pub progress_percent: f64,

    /// Planned start
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Planned end
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    /// Lifecycle status
    pub status: NodeStatus,

    /// Business priority
    pub priority: Priority,

    /// Optional quality indicators
    #[serde(default)]
    pub quality: QualityIndicators,

    /// Optional team indicators
    #[serde(default)]
    pub team: TeamIndicators,
}

impl Node {
    /// Create an active, medium-priority node with no budget or schedule.
    pub fn new(id: impl Into<NodeId>, tenant_id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            budget: 0.0,
            actual_cost: 0.0,
            progress_percent: 0.0,
            start_date: None,
            end_date: None,
            status: NodeStatus::Active,
            priority: Priority::Medium,
            quality: QualityIndicators::default(),
            team: TeamIndicators::default(),
        }
    }

    /// Set budget and actual cost
    #[must_use]
    pub fn with_budget(mut self, budget: f64, actual_cost: f64) -> Self {
        self.budget = budget;
        self.actual_cost = actual_cost;
        self
    }

    /// Set the planned schedule window
    #[must_use]
    pub fn with_schedule(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Set the completion percentage
    #[must_use]
    pub fn with_progress(mut self, progress_percent: f64) -> Self {
        self.progress_percent = progress_percent;
        self
    }

    /// Set the status
    #[must_use]
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Planned duration in whole days, 0 when either date is missing.
    #[must_use]
    pub fn duration_days(&self) -> f64 {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => {
                #[allow(clippy::cast_precision_loss)]
                let days = (end - start).num_days() as f64;
                days.max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Validate the scalar attributes the engine depends on.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when a value is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("node id cannot be empty".to_string());
        }
        if !(0.0..=MAX_PROGRESS).contains(&self.progress_percent) {
            return Err(format!(
                "progress {} is outside 0-100",
                self.progress_percent
            ));
        }
        if self.budget < 0.0 || self.actual_cost < 0.0 {
            return Err("budget and cost must be non-negative".to_string());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(format!("end date {end} precedes start date {start}"));
            }
        }
        Ok(())
    }
}

/// Filter for listing nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Restrict to one tenant
    pub tenant: Option<TenantId>,

    /// Restrict to these statuses
    pub statuses: Option<Vec<NodeStatus>>,

    /// Exclude terminal statuses
    pub active_only: bool,

    /// Limit number of results
    pub limit: Option<usize>,
}

impl NodeFilter {
    /// Filter matching every non-terminal node across tenants
    #[must_use]
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// Whether a node passes this filter (ignores `limit`)
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(tenant) = &self.tenant {
            if &node.tenant_id != tenant {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&node.status) {
                return false;
            }
        }
        !(self.active_only && node.status.is_terminal())
    }
}

/// Cached roll-up for a node promoted to master.
///
/// Engine-derived: recomputed on structural change or by the scheduler and
/// never mutated by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterAggregate {
    /// The master node
    pub master_id: NodeId,

    /// Sum of budgets over the master and its descendants
    pub aggregated_budget: f64,

    /// Sum of actual costs over the same set
    pub aggregated_cost: f64,

    /// Budget-weighted progress over the same set
    pub aggregated_progress: f64,

    /// Descendant count (master excluded)
    pub total_sub_nodes: usize,

    /// Descendants in a non-terminal status
    pub active_sub_nodes: usize,

    /// Earliest planned start across the set
    pub earliest_start: Option<DateTime<Utc>>,

    /// Latest planned end across the set
    pub latest_end: Option<DateTime<Utc>>,

    /// When this record was computed
    pub last_aggregated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_duration_days() {
        let node = Node::new("a", "t1", "A").with_schedule(day(1), day(11));
        assert!((node.duration_days() - 10.0).abs() < f64::EPSILON);

        let undated = Node::new("b", "t1", "B");
        assert!(undated.duration_days().abs() < f64::EPSILON);
    }

    #[rstest]
    #[case::negative_progress(-1.0, 0.0, 0.0)]
    #[case::progress_over_100(101.0, 0.0, 0.0)]
    #[case::negative_budget(10.0, -5.0, 0.0)]
    #[case::negative_cost(10.0, 5.0, -1.0)]
    fn test_validate_rejects_out_of_range(
        #[case] progress: f64,
        #[case] budget: f64,
        #[case] cost: f64,
    ) {
        let node = Node::new("a", "t1", "A")
            .with_progress(progress)
            .with_budget(budget, cost);
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_schedule() {
        let node = Node::new("a", "t1", "A").with_schedule(day(10), day(2));
        let err = node.validate().unwrap_err();
        assert!(err.contains("precedes"));
    }

    #[rstest]
    #[case(NodeStatus::Completed, true)]
    #[case(NodeStatus::Cancelled, true)]
    #[case(NodeStatus::Active, false)]
    #[case(NodeStatus::OnHold, false)]
    fn test_terminal_statuses(#[case] status: NodeStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn test_filter_matches() {
        let node = Node::new("a", "t1", "A");
        let done = Node::new("b", "t1", "B").with_status(NodeStatus::Completed);

        assert!(NodeFilter::active().matches(&node));
        assert!(!NodeFilter::active().matches(&done));

        let other_tenant = NodeFilter {
            tenant: Some(TenantId::from("t2")),
            ..NodeFilter::default()
        };
        assert!(!other_tenant.matches(&node));

        let only_done = NodeFilter {
            statuses: Some(vec![NodeStatus::Completed]),
            ..NodeFilter::default()
        };
        assert!(only_done.matches(&done));
        assert!(!only_done.matches(&node));
    }

    #[test]
    fn test_indicators_default_when_absent() {
        let json = r#"{"id":"a","tenant_id":"t1","name":"A","status":"active","priority":"high"}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.quality, QualityIndicators::default());
        assert!(node.team.velocity_trend.is_none());
        assert_eq!(node.priority, Priority::High);
    }
}
