//! Temporal consistency of dependency edges against planned dates.
//!
//! Each dependency type requires an ordering between one date of the
//! predecessor and one date of the successor:
//!
//! | type | requirement |
//! |---|---|
//! | FS | `succ.start >= pred.end + lag` |
//! | SS | `succ.start >= pred.start + lag` |
//! | FF | `succ.end >= pred.end + lag` |
//! | SF | `succ.end >= pred.start + lag` |

use crate::domain::{
    DependencyEdge, DependencyType, EdgeId, Node, NodeId, NodeStatus, ViolationRecord,
    ViolationSeverity,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A broken ordering on one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Offending edge
    pub edge_id: EdgeId,
    /// Predecessor
    pub predecessor: NodeId,
    /// Successor
    pub successor: NodeId,
    /// Edge type
    pub dependency_type: DependencyType,
    /// Edge lag
    pub lag_days: i32,
    /// Days by which the requirement is missed
    pub violation_days: f64,
    /// Severity after escalation
    pub severity: ViolationSeverity,
    /// When the scan found it
    pub detected_at: DateTime<Utc>,
}

impl Violation {
    /// Record stored on the edge
    #[must_use]
    pub fn record(&self) -> ViolationRecord {
        ViolationRecord {
            detected_at: self.detected_at,
            severity: self.severity,
            violation_days: self.violation_days,
        }
    }
}

/// Severity for a miss of `days`, one level higher when the successor is
/// active.
#[must_use]
pub fn severity_for(days: f64, successor_active: bool) -> ViolationSeverity {
    let base = if days <= 3.0 {
        ViolationSeverity::Low
    } else if days <= 7.0 {
        ViolationSeverity::Medium
    } else if days <= 14.0 {
        ViolationSeverity::High
    } else {
        ViolationSeverity::Critical
    };
    if successor_active { base.escalate() } else { base }
}

#[allow(clippy::cast_precision_loss)]
fn days(delta: Duration) -> f64 {
    delta.num_seconds() as f64 / 86_400.0
}

/// Check one edge. `None` when the ordering holds or a needed date is missing.
#[must_use]
pub fn check(
    edge: &DependencyEdge,
    predecessor: &Node,
    successor: &Node,
    now: DateTime<Utc>,
) -> Option<Violation> {
    let (anchor, constrained) = match edge.dependency_type {
        DependencyType::FinishToStart => (predecessor.end_date?, successor.start_date?),
        DependencyType::StartToStart => (predecessor.start_date?, successor.start_date?),
        DependencyType::FinishToFinish => (predecessor.end_date?, successor.end_date?),
        DependencyType::StartToFinish => (predecessor.start_date?, successor.end_date?),
    };
    let required = anchor + Duration::days(i64::from(edge.lag_days));
    if constrained >= required {
        return None;
    }

    let violation_days = days(required - constrained);
    Some(Violation {
        edge_id: edge.id.clone(),
        predecessor: edge.predecessor.clone(),
        successor: edge.successor.clone(),
        dependency_type: edge.dependency_type,
        lag_days: edge.lag_days,
        violation_days,
        severity: severity_for(violation_days, successor.status == NodeStatus::Active),
        detected_at: now,
    })
}
