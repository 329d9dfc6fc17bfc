//! Integration tests for network structure analysis.
//!
//! Cyclic fixtures are written straight to the store, which does not
//! validate structure; the engine itself never admits a cycle.

use trellis::domain::{DependencyType, Impact, NewDependency, NodeId};
use trellis::storage::GraphStore;

mod common;
use common::{Harness, node};

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

async fn raw_edge(harness: &Harness, pred: &str, succ: &str) {
    harness
        .store
        .insert_dependency(NewDependency::new(pred, succ, DependencyType::FinishToStart), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_single_three_cycle_is_one_component() {
    let ids = ["a", "b", "c", "d", "e", "f"];
    let harness = Harness::with_nodes(ids.iter().map(|i| node(i)).collect()).await;
    // a -> b -> c -> a, plus acyclic tails
    for (p, s) in [("a", "b"), ("b", "c"), ("c", "a"), ("c", "d"), ("d", "e"), ("f", "e")] {
        raw_edge(&harness, p, s).await;
    }

    let snapshot = harness.engine.network().snapshot_all().await.unwrap();
    let components = snapshot.strongly_connected_components();

    assert_eq!(components, vec![vec![id("a"), id("b"), id("c")]]);
    assert_eq!(snapshot.summary().cycles.len(), 1);
}

#[tokio::test]
async fn test_levels_and_density_on_diamond() {
    let harness =
        Harness::with_nodes(vec![node("top"), node("left"), node("right"), node("bottom")]).await;
    let deps = harness.engine.dependencies();
    for (p, s) in [("top", "left"), ("top", "right"), ("left", "bottom"), ("right", "bottom")] {
        deps.create_dependency(NewDependency::new(p, s, DependencyType::FinishToStart), None)
            .await
            .unwrap();
    }

    let snapshot = harness.engine.network().snapshot_from(&id("top")).await.unwrap();

    assert_eq!(snapshot.node_count(), 4);
    assert_eq!(snapshot.level(&id("top")), Some(0));
    assert_eq!(snapshot.level(&id("right")), Some(1));
    assert_eq!(snapshot.level(&id("bottom")), Some(2));
    assert!((snapshot.density() - 4.0 / 12.0).abs() < 1e-9);
    assert!(snapshot.strongly_connected_components().is_empty());
}

#[tokio::test]
async fn test_hub_with_critical_edge_is_bottleneck() {
    let harness = Harness::with_nodes(
        ["hub", "s1", "s2", "s3", "s4", "quiet", "q1", "q2", "q3", "q4"]
            .iter()
            .map(|i| node(i))
            .collect(),
    )
    .await;
    let deps = harness.engine.dependencies();
    for (i, succ) in ["s1", "s2", "s3", "s4"].iter().enumerate() {
        let mut dep = NewDependency::new("hub", *succ, DependencyType::FinishToStart);
        if i == 0 {
            dep = dep.critical(Impact::High);
        }
        deps.create_dependency(dep, None).await.unwrap();
    }
    for succ in ["q1", "q2", "q3", "q4"] {
        deps.create_dependency(NewDependency::new("quiet", succ, DependencyType::FinishToStart), None)
            .await
            .unwrap();
    }

    let summary = harness.engine.network().snapshot_all().await.unwrap().summary();

    assert_eq!(summary.bottlenecks.len(), 1);
    assert_eq!(summary.bottlenecks[0].node_id, id("hub"));
    assert_eq!(summary.bottlenecks[0].out_degree, 4);
}

#[tokio::test]
async fn test_most_critical_route_prefers_critical_edges() {
    let harness =
        Harness::with_nodes(vec![node("s"), node("plain"), node("crit"), node("t")]).await;
    let deps = harness.engine.dependencies();
    deps.create_dependency(NewDependency::new("s", "plain", DependencyType::FinishToStart), None)
        .await
        .unwrap();
    deps.create_dependency(NewDependency::new("plain", "t", DependencyType::FinishToStart), None)
        .await
        .unwrap();
    deps.create_dependency(
        NewDependency::new("s", "crit", DependencyType::FinishToStart).critical(Impact::Critical),
        None,
    )
    .await
    .unwrap();
    deps.create_dependency(
        NewDependency::new("crit", "t", DependencyType::FinishToStart).critical(Impact::Critical),
        None,
    )
    .await
    .unwrap();

    let snapshot = harness.engine.network().snapshot_all().await.unwrap();
    let route = snapshot.critical_path_between(&id("s"), &id("t"));

    assert_eq!(route, vec![id("s"), id("crit"), id("t")]);
}
