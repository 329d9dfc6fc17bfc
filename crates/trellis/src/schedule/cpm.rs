//! Critical Path Method over a dependency network.
//!
//! Durations are whole days taken from each node's planned window (0 when a
//! date is missing). Times are day offsets from the network start, so the
//! earliest node starts at 0.
//!
//! # Type adjustments
//!
//! Forward pass, for an edge `p -> s` with lag `l` and successor duration `d`:
//!
//! | type | constraint on `ES(s)` |
//! |---|---|
//! | FS | `EF(p) + l` |
//! | SS | `ES(p) + l` |
//! | FF | `EF(p) + l - d` |
//! | SF | `ES(p) + l - d` |
//!
//! Backward pass, with predecessor duration `dp`:
//!
//! | type | constraint on `LF(p)` |
//! |---|---|
//! | FS | `LS(s) - l` |
//! | SS | `LS(s) - l + dp` |
//! | FF | `LF(s) - l` |
//! | SF | `LF(s) - l + dp` |

use crate::domain::{DependencyEdge, DependencyType, Node, NodeId};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Schedule figures for one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    /// Node
    pub node_id: NodeId,
    /// Duration in days
    pub duration: f64,
    /// Earliest start offset
    pub early_start: f64,
    /// Earliest finish offset
    pub early_finish: f64,
    /// Latest start offset that keeps the project end
    pub late_start: f64,
    /// Latest finish offset that keeps the project end
    pub late_finish: f64,
    /// `late_start - early_start`
    pub slack: f64,
    /// Slack within tolerance
    pub is_critical: bool,
}

/// Result of a CPM pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalPath {
    /// Every node in topological order
    pub entries: Vec<ScheduleEntry>,
    /// Critical nodes in topological order
    pub critical_path: Vec<NodeId>,
    /// Largest early finish in the network
    pub project_duration: f64,
    /// Set when ordering stalled on a cycle and was forced
    pub had_cycle: bool,
}

impl CriticalPath {
    /// Entry for one node
    #[must_use]
    pub fn entry(&self, id: &NodeId) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| &e.node_id == id)
    }
}

/// Kahn ordering over `ids` with ties broken by id.
///
/// Returns the order and whether a cycle forced the remainder to be appended.
pub(crate) fn topological_order(ids: &[NodeId], edges: &[&DependencyEdge]) -> (Vec<NodeId>, bool) {
    let mut in_degree: HashMap<&NodeId, usize> = ids.iter().map(|id| (id, 0)).collect();
    let mut outgoing: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in edges {
        if let Some(degree) = in_degree.get_mut(&edge.successor) {
            *degree += 1;
        }
        outgoing.entry(&edge.predecessor).or_default().push(&edge.successor);
    }

    let mut ready: BinaryHeap<Reverse<&NodeId>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(Reverse(id)) = ready.pop() {
        order.push(id.clone());
        for next in outgoing.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(*next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*next));
                }
            }
        }
    }

    let had_cycle = order.len() < ids.len();
    if had_cycle {
        let mut rest: Vec<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        rest.sort();
        order.extend(rest.into_iter().cloned());
    }
    (order, had_cycle)
}

/// Run forward and backward passes over `nodes` joined by `edges`.
///
/// Edges with an endpoint outside `nodes`, and inactive edges, are ignored.
#[must_use]
pub fn compute(nodes: &[Node], edges: &[DependencyEdge], slack_tolerance: f64) -> CriticalPath {
    let durations: HashMap<&NodeId, f64> =
        nodes.iter().map(|n| (&n.id, n.duration_days())).collect();
    let edges: Vec<&DependencyEdge> = edges
        .iter()
        .filter(|e| {
            e.is_active() && durations.contains_key(&e.predecessor) && durations.contains_key(&e.successor)
        })
        .collect();
    let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();

    let (order, had_cycle) = topological_order(&ids, &edges);
    if had_cycle {
        tracing::warn!(nodes = ids.len(), "Dependency network contains a cycle; CPM order forced");
    }

    let mut incoming: HashMap<&NodeId, Vec<&DependencyEdge>> = HashMap::new();
    let mut outgoing: HashMap<&NodeId, Vec<&DependencyEdge>> = HashMap::new();
    for edge in edges.iter().copied() {
        incoming.entry(&edge.successor).or_default().push(edge);
        outgoing.entry(&edge.predecessor).or_default().push(edge);
    }
    let duration = |id: &NodeId| durations.get(id).copied().unwrap_or(0.0);

    // Forward pass
    let mut early_start: HashMap<&NodeId, f64> = HashMap::new();
    for id in &order {
        let d = duration(id);
        let mut es: f64 = 0.0;
        for edge in incoming.get(id).into_iter().flatten() {
            let Some(&pred_es) = early_start.get(&edge.predecessor) else {
                continue;
            };
            let pred_ef = pred_es + duration(&edge.predecessor);
            let lag = f64::from(edge.lag_days);
            let constraint = match edge.dependency_type {
                DependencyType::FinishToStart => pred_ef + lag,
                DependencyType::StartToStart => pred_es + lag,
                DependencyType::FinishToFinish => pred_ef + lag - d,
                DependencyType::StartToFinish => pred_es + lag - d,
            };
            es = es.max(constraint);
        }
        early_start.insert(id, es);
    }

    let project_duration = order
        .iter()
        .map(|id| early_start.get(id).copied().unwrap_or(0.0) + duration(id))
        .fold(0.0, f64::max);

    // Backward pass
    let mut late_finish: HashMap<&NodeId, f64> = HashMap::new();
    for id in order.iter().rev() {
        let dp = duration(id);
        let mut lf = project_duration;
        for edge in outgoing.get(id).into_iter().flatten() {
            let Some(&succ_lf) = late_finish.get(&edge.successor) else {
                continue;
            };
            let succ_ls = succ_lf - duration(&edge.successor);
            let lag = f64::from(edge.lag_days);
            let constraint = match edge.dependency_type {
                DependencyType::FinishToStart => succ_ls - lag,
                DependencyType::StartToStart => succ_ls - lag + dp,
                DependencyType::FinishToFinish => succ_lf - lag,
                DependencyType::StartToFinish => succ_lf - lag + dp,
            };
            lf = lf.min(constraint);
        }
        late_finish.insert(id, lf);
    }

    let entries: Vec<ScheduleEntry> = order
        .iter()
        .map(|id| {
            let d = duration(id);
            let es = early_start.get(id).copied().unwrap_or(0.0);
            let lf = late_finish.get(id).copied().unwrap_or(project_duration);
            let ls = lf - d;
            let slack = ls - es;
            ScheduleEntry {
                node_id: id.clone(),
                duration: d,
                early_start: es,
                early_finish: es + d,
                late_start: ls,
                late_finish: lf,
                slack,
                is_critical: slack <= slack_tolerance,
            }
        })
        .collect();

    let critical_path = entries
        .iter()
        .filter(|e| e.is_critical)
        .map(|e| e.node_id.clone())
        .collect();

    CriticalPath {
        entries,
        critical_path,
        project_duration,
        had_cycle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyMetadata, DependencyStatus, EdgeId, Impact};
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, 0, 0, 0).unwrap()
    }

    fn node(id: &str, days: u32) -> Node {
        Node::new(id, "t1", id).with_schedule(day(1), day(1 + days))
    }

    fn edge(from: &str, to: &str, kind: DependencyType, lag: i32) -> DependencyEdge {
        DependencyEdge {
            id: EdgeId::new(format!("dep-{from}{to}")),
            predecessor: NodeId::from(from),
            successor: NodeId::from(to),
            dependency_type: kind,
            lag_days: lag,
            is_critical: false,
            impact: Impact::None,
            status: DependencyStatus::Active,
            metadata: DependencyMetadata::default(),
            created_at: day(1),
            updated_at: day(1),
        }
    }

    fn ids(list: &[&str]) -> Vec<NodeId> {
        list.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn test_chain_is_fully_critical() {
        let nodes = vec![node("a", 3), node("b", 2), node("c", 4)];
        let edges = vec![
            edge("a", "b", DependencyType::FinishToStart, 0),
            edge("b", "c", DependencyType::FinishToStart, 0),
        ];
        let result = compute(&nodes, &edges, 0.01);

        assert_eq!(result.critical_path, ids(&["a", "b", "c"]));
        assert!((result.project_duration - 9.0).abs() < 1e-9);
        let c = result.entry(&NodeId::from("c")).unwrap();
        assert!((c.early_start - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_branch_has_slack() {
        // a -> b -> d and a -> c -> d, where c is shorter than b
        let nodes = vec![node("a", 2), node("b", 5), node("c", 1), node("d", 2)];
        let edges = vec![
            edge("a", "b", DependencyType::FinishToStart, 0),
            edge("a", "c", DependencyType::FinishToStart, 0),
            edge("b", "d", DependencyType::FinishToStart, 0),
            edge("c", "d", DependencyType::FinishToStart, 0),
        ];
        let result = compute(&nodes, &edges, 0.01);

        assert_eq!(result.critical_path, ids(&["a", "b", "d"]));
        let c = result.entry(&NodeId::from("c")).unwrap();
        assert!((c.slack - 4.0).abs() < 1e-9);
        assert!(!c.is_critical);
    }

    #[rstest]
    #[case::fs(DependencyType::FinishToStart, 2, 6.0)]
    #[case::ss(DependencyType::StartToStart, 2, 2.0)]
    #[case::ff(DependencyType::FinishToFinish, 2, 3.0)]
    #[case::sf(DependencyType::StartToFinish, 5, 2.0)]
    fn test_type_adjusted_early_start(
        #[case] kind: DependencyType,
        #[case] lag: i32,
        #[case] expected_es: f64,
    ) {
        // Predecessor lasts 4 days, successor 3 days
        let nodes = vec![node("p", 4), node("s", 3)];
        let edges = vec![edge("p", "s", kind, lag)];
        let result = compute(&nodes, &edges, 0.01);
        let s = result.entry(&NodeId::from("s")).unwrap();
        assert!((s.early_start - expected_es).abs() < 1e-9, "{kind}: {}", s.early_start);
    }

    #[test]
    fn test_undated_nodes_have_zero_duration() {
        let nodes = vec![Node::new("a", "t1", "A"), Node::new("b", "t1", "B")];
        let edges = vec![edge("a", "b", DependencyType::FinishToStart, 0)];
        let result = compute(&nodes, &edges, 0.01);
        assert_eq!(result.critical_path, ids(&["a", "b"]));
        assert!(result.project_duration.abs() < 1e-9);
    }

    #[test]
    fn test_cycle_forces_order() {
        let nodes = vec![node("a", 1), node("b", 1), node("c", 1)];
        let edges = vec![
            edge("a", "b", DependencyType::FinishToStart, 0),
            edge("b", "a", DependencyType::FinishToStart, 0),
            edge("c", "a", DependencyType::FinishToStart, 0),
        ];
        let result = compute(&nodes, &edges, 0.01);
        assert!(result.had_cycle);
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.entries[0].node_id, NodeId::from("c"));
    }

    #[test]
    fn test_foreign_edges_ignored() {
        let nodes = vec![node("a", 1)];
        let edges = vec![edge("a", "zzz", DependencyType::FinishToStart, 0)];
        let result = compute(&nodes, &edges, 0.01);
        assert_eq!(result.entries.len(), 1);
        assert!(!result.had_cycle);
    }
}
