//! JSONL persistence for the in-memory store.
//!
//! A dataset is a directory with three JSON Lines files:
//!
//! - `nodes.jsonl`: one [`Node`] per line
//! - `relationships.jsonl`: one [`RelationshipEdge`] per line
//! - `dependencies.jsonl`: one [`DependencyEdge`] per line
//!
//! Missing files are treated as empty.

use super::InMemoryStore;
use super::graph::has_path;
use super::inner::InMemoryStoreInner;
use crate::domain::{
    DependencyEdge, EdgeId, EdgeKind, Node, NodeId, RelationshipEdge, RelationshipType,
};
use crate::error::{Error, Result, StorageError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

/// File holding node snapshots
pub const NODES_FILE: &str = "nodes.jsonl";

/// File holding relationship edges
pub const RELATIONSHIPS_FILE: &str = "relationships.jsonl";

/// File holding dependency edges
pub const DEPENDENCIES_FILE: &str = "dependencies.jsonl";

/// Non-fatal problems found while loading a dataset.
///
/// The offending record is skipped; everything else loads.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// A line that is not valid JSON for its record type
    MalformedJson {
        /// File the line came from
        file: &'static str,
        /// 1-based line number
        line_number: usize,
        /// Parser message
        error: String,
    },

    /// A node whose attributes are out of range
    InvalidNode {
        /// Offending node
        node_id: NodeId,
        /// 1-based line number
        line_number: usize,
        /// Validation message
        error: String,
    },

    /// An edge whose endpoint is not among the loaded nodes
    OrphanedEdge {
        /// Skipped edge
        edge_id: EdgeId,
        /// Source or predecessor
        from: NodeId,
        /// Target or successor
        to: NodeId,
    },

    /// An active edge that would close a loop
    CircularDependency {
        /// Skipped edge
        edge_id: EdgeId,
        /// Source or predecessor
        from: NodeId,
        /// Target or successor
        to: NodeId,
    },

    /// A second active dependency for the same ordered pair
    DuplicateDependency {
        /// Skipped edge
        edge_id: EdgeId,
        /// Predecessor
        predecessor: NodeId,
        /// Successor
        successor: NodeId,
    },

    /// A second active parent or program for the same node
    MultipleParents {
        /// Skipped edge
        edge_id: EdgeId,
        /// Node that already had one
        node: NodeId,
    },

    /// Two records sharing one id
    DuplicateId {
        /// File the later record came from
        file: &'static str,
        /// Repeated id
        id: String,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson {
                file,
                line_number,
                error,
            } => write!(f, "{file}:{line_number}: malformed record: {error}"),
            Self::InvalidNode {
                node_id,
                line_number,
                error,
            } => write!(f, "{NODES_FILE}:{line_number}: invalid node {node_id}: {error}"),
            Self::OrphanedEdge { edge_id, from, to } => {
                write!(f, "skipped orphaned edge {edge_id} ({from} -> {to})")
            }
            Self::CircularDependency { edge_id, from, to } => {
                write!(f, "skipped cycle-closing edge {edge_id} ({from} -> {to})")
            }
            Self::DuplicateDependency {
                edge_id,
                predecessor,
                successor,
            } => write!(
                f,
                "skipped duplicate dependency {edge_id} ({predecessor} -> {successor})"
            ),
            Self::MultipleParents { edge_id, node } => {
                write!(f, "skipped edge {edge_id}: {node} already has an active link")
            }
            Self::DuplicateId { file, id } => write!(f, "{file}: duplicate id {id}"),
        }
    }
}

/// Read one JSONL file, collecting malformed lines as warnings.
async fn read_records<T: DeserializeOwned>(
    dir: &Path,
    file: &'static str,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Vec<(usize, T)>> {
    let handle = match File::open(dir.join(file)).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut lines = BufReader::new(handle).lines();
    let mut records = Vec::new();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push((line_number, record)),
            Err(e) => warnings.push(LoadWarning::MalformedJson {
                file,
                line_number,
                error: e.to_string(),
            }),
        }
    }

    Ok(records)
}

/// Load a store from a JSONL dataset directory.
///
/// # Loading Order
///
/// 1. Nodes, validated with [`Node::validate`]
/// 2. Relationship edges; active ones are checked for orphans, a second
///    active parent/program, and (for `PARENT_CHILD`) cycles
/// 3. Dependency edges; active ones are checked for orphans, duplicate pairs
///    and cycles
///
/// Inactive edges are kept for history without structural checks, apart
/// from orphan detection.
///
/// # Errors
///
/// Returns `Error::Io` if a file exists but cannot be read. Malformed
/// content never fails the load; it is reported in the warnings.
pub async fn load_from_jsonl(dir: &Path) -> Result<(InMemoryStore, Vec<LoadWarning>)> {
    let mut warnings = Vec::new();

    let nodes: Vec<(usize, Node)> = read_records(dir, NODES_FILE, &mut warnings).await?;
    let relationships: Vec<(usize, RelationshipEdge)> =
        read_records(dir, RELATIONSHIPS_FILE, &mut warnings).await?;
    let dependencies: Vec<(usize, DependencyEdge)> =
        read_records(dir, DEPENDENCIES_FILE, &mut warnings).await?;

    let store = InMemoryStore::new();
    let mut inner = store.inner.write().await;

    for (line_number, node) in nodes {
        if let Err(error) = node.validate() {
            warnings.push(LoadWarning::InvalidNode {
                node_id: node.id.clone(),
                line_number,
                error,
            });
            continue;
        }
        if inner.nodes.contains_key(&node.id) {
            warnings.push(LoadWarning::DuplicateId {
                file: NODES_FILE,
                id: node.id.to_string(),
            });
            continue;
        }
        inner.ensure_vertex(&node.id);
        inner.nodes.insert(node.id.clone(), node);
    }

    for (_, edge) in relationships {
        if let Some(warning) = check_relationship(&inner, &edge) {
            warnings.push(warning);
            continue;
        }
        inner.put_relationship(edge);
    }

    for (_, edge) in dependencies {
        if let Some(warning) = check_dependency(&inner, &edge) {
            warnings.push(warning);
            continue;
        }
        inner.put_dependency(edge);
    }

    for warning in &warnings {
        tracing::warn!(dir = %dir.display(), "{warning}");
    }
    tracing::debug!(
        dir = %dir.display(),
        nodes = inner.nodes.len(),
        relationships = inner.relationships.len(),
        dependencies = inner.dependencies.len(),
        "Loaded dataset"
    );

    drop(inner);
    Ok((store, warnings))
}

fn check_relationship(inner: &InMemoryStoreInner, edge: &RelationshipEdge) -> Option<LoadWarning> {
    if inner.relationships.contains_key(&edge.id) {
        return Some(LoadWarning::DuplicateId {
            file: RELATIONSHIPS_FILE,
            id: edge.id.to_string(),
        });
    }
    if !inner.nodes.contains_key(&edge.source) || !inner.nodes.contains_key(&edge.target) {
        return Some(LoadWarning::OrphanedEdge {
            edge_id: edge.id.clone(),
            from: edge.source.clone(),
            to: edge.target.clone(),
        });
    }
    if !edge.is_active {
        return None;
    }

    let single_source = matches!(
        edge.relationship_type,
        RelationshipType::ParentChild | RelationshipType::Program
    );
    if single_source
        && inner.relationships.values().any(|other| {
            other.is_active
                && other.relationship_type == edge.relationship_type
                && other.target == edge.target
        })
    {
        return Some(LoadWarning::MultipleParents {
            edge_id: edge.id.clone(),
            node: edge.target.clone(),
        });
    }

    let kind = EdgeKind::Relationship(edge.relationship_type);
    if edge.relationship_type == RelationshipType::ParentChild
        && (edge.source == edge.target
            || has_path(&inner.graph, &inner.node_map, kind, &edge.target, &edge.source))
    {
        return Some(LoadWarning::CircularDependency {
            edge_id: edge.id.clone(),
            from: edge.source.clone(),
            to: edge.target.clone(),
        });
    }
    None
}

fn check_dependency(inner: &InMemoryStoreInner, edge: &DependencyEdge) -> Option<LoadWarning> {
    if inner.dependencies.contains_key(&edge.id) {
        return Some(LoadWarning::DuplicateId {
            file: DEPENDENCIES_FILE,
            id: edge.id.to_string(),
        });
    }
    if !inner.nodes.contains_key(&edge.predecessor) || !inner.nodes.contains_key(&edge.successor)
    {
        return Some(LoadWarning::OrphanedEdge {
            edge_id: edge.id.clone(),
            from: edge.predecessor.clone(),
            to: edge.successor.clone(),
        });
    }
    if !edge.is_active() {
        return None;
    }
    if inner.active_pair(&edge.predecessor, &edge.successor).is_some() {
        return Some(LoadWarning::DuplicateDependency {
            edge_id: edge.id.clone(),
            predecessor: edge.predecessor.clone(),
            successor: edge.successor.clone(),
        });
    }
    if edge.predecessor == edge.successor
        || has_path(
            &inner.graph,
            &inner.node_map,
            EdgeKind::Dependency,
            &edge.successor,
            &edge.predecessor,
        )
    {
        return Some(LoadWarning::CircularDependency {
            edge_id: edge.id.clone(),
            from: edge.predecessor.clone(),
            to: edge.successor.clone(),
        });
    }
    None
}

/// Write records to `dir/file` atomically (temp file, then rename).
async fn write_records<T: Serialize>(dir: &Path, file: &str, records: &[T]) -> Result<()> {
    let path = dir.join(file);
    let temp_path = path.with_extension("jsonl.tmp");

    let handle = File::create(&temp_path).await?;
    let mut writer = BufWriter::new(handle);
    for record in records {
        let json = serde_json::to_string(record).map_err(StorageError::Serialization)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    writer.get_ref().sync_all().await?;
    drop(writer);

    if let Err(e) = fs::rename(&temp_path, &path).await {
        // Best-effort cleanup; the rename error is what matters
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Save a store to a JSONL dataset directory.
///
/// Records are written sorted by id so that saving an unchanged store
/// produces identical files. Each file is replaced atomically.
///
/// # Errors
///
/// Returns `Error::Io` if the directory or files cannot be written.
pub async fn save_to_jsonl(store: &InMemoryStore, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;

    let (nodes, relationships, dependencies) = {
        let inner = store.inner.read().await;
        let mut nodes: Vec<Node> = inner.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut relationships: Vec<RelationshipEdge> =
            inner.relationships.values().cloned().collect();
        relationships.sort_by(|a, b| a.id.cmp(&b.id));
        let mut dependencies: Vec<DependencyEdge> = inner.dependencies.values().cloned().collect();
        dependencies.sort_by(|a, b| a.id.cmp(&b.id));
        (nodes, relationships, dependencies)
    };

    write_records(dir, NODES_FILE, &nodes).await?;
    write_records(dir, RELATIONSHIPS_FILE, &relationships).await?;
    write_records(dir, DEPENDENCIES_FILE, &dependencies).await?;

    tracing::debug!(
        dir = %dir.display(),
        nodes = nodes.len(),
        relationships = relationships.len(),
        dependencies = dependencies.len(),
        "Saved dataset"
    );
    Ok(())
}
