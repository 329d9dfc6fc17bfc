//! Dataset directory round trips and the warnings produced by bad records.

mod common;

use common::{Harness, node, scheduled};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use trellis::domain::{DependencyType, EdgeId, NewDependency, NodeId, RelationshipType};
use trellis::storage::in_memory::{
    DEPENDENCIES_FILE, LoadWarning, NODES_FILE, load_from_jsonl, save_to_jsonl,
};
use trellis::storage::{GraphStore, NodeProvider};

fn id(raw: &str) -> NodeId {
    NodeId::from(raw)
}

/// Saves `a -> b` (finish-to-start) with `a` as parent of `b`.
async fn seed(dir: &Path) {
    let harness =
        Harness::with_nodes(vec![scheduled("a", 0, 5), scheduled("b", 5, 3), node("c")]).await;
    harness
        .engine
        .relationships()
        .set_parent(&id("b"), &id("a"), Some("seed"))
        .await
        .unwrap();
    harness
        .engine
        .dependencies()
        .create_dependency(
            NewDependency::new("a", "b", DependencyType::FinishToStart),
            Some("seed"),
        )
        .await
        .unwrap();
    save_to_jsonl(&harness.store, dir).await.unwrap();
}

/// First saved dependency line with a new id and the given endpoints.
async fn forged_dependency(
    dir: &Path,
    edge_id: &str,
    predecessor: &str,
    successor: &str,
) -> String {
    let content = tokio::fs::read_to_string(dir.join(DEPENDENCIES_FILE)).await.unwrap();
    let first = content.lines().next().expect("seeded dependency");
    let mut record: Value = serde_json::from_str(first).unwrap();
    record["id"] = Value::from(edge_id);
    record["predecessor"] = Value::from(predecessor);
    record["successor"] = Value::from(successor);
    serde_json::to_string(&record).unwrap()
}

async fn append_lines(path: &Path, lines: &[&str]) {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .unwrap();
    for line in lines {
        file.write_all(line.as_bytes()).await.unwrap();
        file.write_all(b"\n").await.unwrap();
    }
    file.flush().await.unwrap();
}

#[tokio::test]
async fn test_missing_files_load_empty() {
    let temp_dir = TempDir::new().unwrap();
    let (store, warnings) = load_from_jsonl(temp_dir.path()).await.unwrap();

    assert!(warnings.is_empty());
    assert_eq!(store.node_count().await, 0);
    assert!(store.active_dependencies().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_round_trip_keeps_structure() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path()).await;

    let (store, warnings) = load_from_jsonl(temp_dir.path()).await.unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    assert_eq!(store.node_count().await, 3);

    let b = store.get_node(&id("b")).await.unwrap().unwrap();
    assert!((b.duration_days() - 3.0).abs() < f64::EPSILON);

    let deps = store.dependencies_from(&id("a")).await.unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].successor, id("b"));
    assert_eq!(deps[0].metadata.created_by.as_deref(), Some("seed"));

    let parents = store
        .relationships_to(&id("b"), RelationshipType::ParentChild)
        .await
        .unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].source, id("a"));
}

#[tokio::test]
async fn test_malformed_and_orphaned_lines_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path()).await;

    let orphan = forged_dependency(temp_dir.path(), "dep-orphan", "a", "ghost").await;
    append_lines(
        &temp_dir.path().join(DEPENDENCIES_FILE),
        &[orphan.as_str(), "{not json"],
    )
    .await;

    let (store, warnings) = load_from_jsonl(temp_dir.path()).await.unwrap();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(warnings.iter().any(|w| matches!(
        w,
        LoadWarning::MalformedJson { file, line_number: 3, .. } if *file == DEPENDENCIES_FILE
    )));
    assert!(warnings.contains(&LoadWarning::OrphanedEdge {
        edge_id: EdgeId::new("dep-orphan"),
        from: id("a"),
        to: id("ghost"),
    }));

    // The good record still loads
    assert_eq!(store.active_dependencies().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_structural_violations_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path()).await;

    let reverse = forged_dependency(temp_dir.path(), "dep-reverse", "b", "a").await;
    let duplicate = forged_dependency(temp_dir.path(), "dep-again", "a", "b").await;
    append_lines(
        &temp_dir.path().join(DEPENDENCIES_FILE),
        &[reverse.as_str(), duplicate.as_str()],
    )
    .await;

    let (store, warnings) = load_from_jsonl(temp_dir.path()).await.unwrap();
    assert_eq!(
        warnings,
        vec![
            LoadWarning::CircularDependency {
                edge_id: EdgeId::new("dep-reverse"),
                from: id("b"),
                to: id("a"),
            },
            LoadWarning::DuplicateDependency {
                edge_id: EdgeId::new("dep-again"),
                predecessor: id("a"),
                successor: id("b"),
            },
        ]
    );
    assert!(store.dependencies_from(&id("b")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_and_repeated_nodes_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path()).await;

    let mut overshoot = serde_json::to_value(node("d")).unwrap();
    overshoot["progress_percent"] = Value::from(150.0);
    let overshoot = serde_json::to_string(&overshoot).unwrap();
    let repeated = serde_json::to_string(&node("c")).unwrap();
    append_lines(
        &temp_dir.path().join(NODES_FILE),
        &[overshoot.as_str(), repeated.as_str()],
    )
    .await;

    let (store, warnings) = load_from_jsonl(temp_dir.path()).await.unwrap();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(matches!(
        &warnings[0],
        LoadWarning::InvalidNode { node_id, line_number: 4, .. } if node_id == &id("d")
    ));
    assert_eq!(
        warnings[1],
        LoadWarning::DuplicateId {
            file: NODES_FILE,
            id: "c".to_string(),
        }
    );
    assert_eq!(store.node_count().await, 3);
}
