//! Relationship and dependency edges.

use super::{EdgeId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a structural relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Hierarchy: source is the parent, target the child (forest-shaped)
    ParentChild,

    /// Program grouping: source is the program, target the member
    Program,

    /// Self-referential marker promoting a node to aggregation root
    Master,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentChild => write!(f, "PARENT_CHILD"),
            Self::Program => write!(f, "PROGRAM"),
            Self::Master => write!(f, "MASTER"),
        }
    }
}

/// Edge family used by traversal queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Active relationship edges of one type
    Relationship(RelationshipType),

    /// Active dependency edges of any dependency type
    Dependency,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relationship(kind) => write!(f, "{kind}"),
            Self::Dependency => write!(f, "DEPENDENCY"),
        }
    }
}

/// Audit metadata carried by a relationship edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipMetadata {
    /// Actor that created the edge
    pub created_by: Option<String>,

    /// Actor that deactivated the edge
    pub deactivated_by: Option<String>,

    /// Free-form note
    pub note: Option<String>,
}

/// Directed structural edge, soft-deleted rather than removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Edge identifier
    pub id: EdgeId,

    /// Parent, program, or the master node itself
    pub source: NodeId,

    /// Child, member, or the master node itself
    pub target: NodeId,

    /// Relationship type
    pub relationship_type: RelationshipType,

    /// False once soft-deleted
    pub is_active: bool,

    /// Audit metadata
    #[serde(default)]
    pub metadata: RelationshipMetadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Soft-delete timestamp
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl RelationshipEdge {
    /// Soft-delete this edge. Already inactive edges keep their original
    /// deactivation stamp.
    pub fn deactivate(&mut self, actor: Option<&str>, now: DateTime<Utc>) {
        if self.is_active {
            self.is_active = false;
            self.deactivated_at = Some(now);
            self.metadata.deactivated_by = actor.map(str::to_string);
        }
    }
}

/// Scheduling relationship between a predecessor and a successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    /// Successor starts after the predecessor finishes
    FinishToStart,

    /// Successor starts after the predecessor starts
    StartToStart,

    /// Successor finishes after the predecessor finishes
    FinishToFinish,

    /// Successor finishes after the predecessor starts
    StartToFinish,
}

impl DependencyType {
    /// Transform a predecessor delay into the successor delay.
    ///
    /// | type | successor offset |
    /// |---|---|
    /// | FS | `d + lag` |
    /// | SS | `max(0, d - lag)` |
    /// | FF | `d` |
    /// | SF | `max(0, d + lag)` |
    #[must_use]
    pub fn propagate_delay(self, delay: f64, lag_days: i32) -> f64 {
        let lag = f64::from(lag_days);
        match self {
            Self::FinishToStart => delay + lag,
            Self::StartToStart => (delay - lag).max(0.0),
            Self::FinishToFinish => delay,
            Self::StartToFinish => (delay + lag).max(0.0),
        }
    }

    /// Base weight before impact and criticality modifiers.
    ///
    /// Finish-to-start links transmit the whole predecessor duration and
    /// weigh the most; start-to-finish links the least.
    #[must_use]
    pub fn base_weight(self) -> f64 {
        match self {
            Self::FinishToStart => 1.0,
            Self::StartToStart | Self::FinishToFinish => 0.8,
            Self::StartToFinish => 0.6,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FinishToStart => write!(f, "FINISH_TO_START"),
            Self::StartToStart => write!(f, "START_TO_START"),
            Self::FinishToFinish => write!(f, "FINISH_TO_FINISH"),
            Self::StartToFinish => write!(f, "START_TO_FINISH"),
        }
    }
}

/// Business impact of a dependency slipping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    /// No recorded impact
    #[default]
    None,
    /// Minor
    Low,
    /// Noticeable
    Medium,
    /// Serious
    High,
    /// Program-threatening
    Critical,
}

impl Impact {
    /// Multiplier applied to an edge's base weight
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::None | Self::Low => 1.0,
            Self::Medium => 1.5,
            Self::High => 2.0,
            Self::Critical => 3.0,
        }
    }
}

/// Lifecycle of a dependency edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    /// Participates in scheduling and validation
    #[default]
    Active,

    /// Satisfied; kept for history
    Resolved,

    /// Switched off without being removed
    Inactive,
}

/// Severity of a temporal dependency violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    /// A few days off
    Low,
    /// About a week off
    Medium,
    /// Up to two weeks off
    High,
    /// More than two weeks off
    Critical,
}

impl ViolationSeverity {
    /// One level higher, saturating at `Critical`
    #[must_use]
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Whether this severity is surfaced as an alert
    #[must_use]
    pub fn is_alerting(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Last alerting violation recorded on a dependency edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// When the scan detected it
    pub detected_at: DateTime<Utc>,

    /// Severity at detection time
    pub severity: ViolationSeverity,

    /// How many days the required ordering is broken by
    pub violation_days: f64,
}

/// Structured metadata carried by a dependency edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyMetadata {
    /// Actor that created the edge
    pub created_by: Option<String>,

    /// Actor that last updated the edge
    pub updated_by: Option<String>,

    /// Free-form note
    pub note: Option<String>,

    /// Last HIGH or CRITICAL violation found by the scheduler
    pub last_violation: Option<ViolationRecord>,
}

/// Directed scheduling edge from a predecessor to a successor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Edge identifier
    pub id: EdgeId,

    /// Node that must progress first
    pub predecessor: NodeId,

    /// Node constrained by the predecessor
    pub successor: NodeId,

    /// Scheduling relationship
    pub dependency_type: DependencyType,

    /// Signed lag in days
    pub lag_days: i32,

    /// Flagged as on the critical chain by the owner
    #[serde(default)]
    pub is_critical: bool,

    /// Business impact if it slips
    #[serde(default)]
    pub impact: Impact,

    /// Lifecycle status
    #[serde(default)]
    pub status: DependencyStatus,

    /// Structured metadata
    #[serde(default)]
    pub metadata: DependencyMetadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl DependencyEdge {
    /// Whether the edge participates in the active subgraph
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DependencyStatus::Active
    }

    /// Whether the edge touches the given node
    #[must_use]
    pub fn involves(&self, node: &NodeId) -> bool {
        &self.predecessor == node || &self.successor == node
    }
}

/// Data for creating a dependency
#[derive(Debug, Clone)]
pub struct NewDependency {
    /// Node that must progress first
    pub predecessor: NodeId,

    /// Node constrained by the predecessor
    pub successor: NodeId,

    /// Scheduling relationship
    pub dependency_type: DependencyType,

    /// Signed lag in days
    pub lag_days: i32,

    /// Critical flag
    pub is_critical: bool,

    /// Business impact
    pub impact: Impact,

    /// Optional note
    pub note: Option<String>,
}

impl NewDependency {
    /// Dependency with zero lag, not critical, no impact
    pub fn new(
        predecessor: impl Into<NodeId>,
        successor: impl Into<NodeId>,
        dependency_type: DependencyType,
    ) -> Self {
        Self {
            predecessor: predecessor.into(),
            successor: successor.into(),
            dependency_type,
            lag_days: 0,
            is_critical: false,
            impact: Impact::None,
            note: None,
        }
    }

    /// Set the lag
    #[must_use]
    pub fn with_lag(mut self, lag_days: i32) -> Self {
        self.lag_days = lag_days;
        self
    }

    /// Mark as critical with the given impact
    #[must_use]
    pub fn critical(mut self, impact: Impact) -> Self {
        self.is_critical = true;
        self.impact = impact;
        self
    }

    /// Set the impact without marking critical
    #[must_use]
    pub fn with_impact(mut self, impact: Impact) -> Self {
        self.impact = impact;
        self
    }
}

/// Partial update of a dependency
#[derive(Debug, Clone, Default)]
pub struct DependencyUpdate {
    /// New scheduling relationship
    pub dependency_type: Option<DependencyType>,

    /// New lag
    pub lag_days: Option<i32>,

    /// New critical flag
    pub is_critical: Option<bool>,

    /// New impact
    pub impact: Option<Impact>,

    /// New status
    pub status: Option<DependencyStatus>,

    /// New note (None to leave unchanged)
    pub note: Option<Option<String>>,

    /// Violation found by the scheduler's scan
    pub last_violation: Option<ViolationRecord>,
}

impl DependencyUpdate {
    /// Whether the patch changes anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependency_type.is_none()
            && self.lag_days.is_none()
            && self.is_critical.is_none()
            && self.impact.is_none()
            && self.status.is_none()
            && self.note.is_none()
            && self.last_violation.is_none()
    }

    /// Apply the patch to an edge, stamping the actor and time.
    pub fn apply(&self, edge: &mut DependencyEdge, actor: Option<&str>, now: DateTime<Utc>) {
        if let Some(dependency_type) = self.dependency_type {
            edge.dependency_type = dependency_type;
        }
        if let Some(lag_days) = self.lag_days {
            edge.lag_days = lag_days;
        }
        if let Some(is_critical) = self.is_critical {
            edge.is_critical = is_critical;
        }
        if let Some(impact) = self.impact {
            edge.impact = impact;
        }
        if let Some(status) = self.status {
            edge.status = status;
        }
        if let Some(note) = &self.note {
            edge.metadata.note.clone_from(note);
        }
        if let Some(record) = &self.last_violation {
            edge.metadata.last_violation = Some(record.clone());
        }
        if actor.is_some() {
            edge.metadata.updated_by = actor.map(str::to_string);
        }
        edge.updated_at = now;
    }
}
