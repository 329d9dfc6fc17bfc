//! Error types for trellis operations.
//!
//! Errors fall into two groups:
//!
//! - **[`Error`]**: returned synchronously by interactive operations. Every
//!   variant maps onto one [`ErrorKind`] with a stable code.
//! - **[`UnitFailure`]**: a single node's failure inside a background job.
//!   These are collected and counted but never abort the batch.
//!
//! Hitting the traversal depth cap is deliberately absent here: traversals
//! report it through a `truncated` flag and a warning log.

use crate::domain::{EdgeId, NodeId, TenantId};
use std::fmt;
use std::io;
use thiserror::Error;

/// The error type for trellis operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Node does not exist in the node provider.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge does not exist in the graph store.
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// A dependency from a node to itself.
    #[error("Node {0} cannot depend on itself")]
    SelfDependency(NodeId),

    /// An active edge already exists for the ordered pair.
    #[error("Dependency already exists: {predecessor} -> {successor}")]
    DuplicateEdge {
        /// Predecessor of the existing edge
        predecessor: NodeId,
        /// Successor of the existing edge
        successor: NodeId,
    },

    /// Lag outside the configured bounds.
    #[error("Lag of {lag} days is outside [{min}, {max}]")]
    LagOutOfRange {
        /// Requested lag
        lag: i32,
        /// Lower bound
        min: i32,
        /// Upper bound
        max: i32,
    },

    /// A node already has an active parent or program.
    #[error("Node {node} already has an active {relationship} link from {existing}")]
    MultipleParents {
        /// Node being linked
        node: NodeId,
        /// Current parent or program
        existing: NodeId,
        /// Relationship type name
        relationship: String,
    },

    /// Structurally invalid relationship request.
    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    /// Generic input validation failure.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Adding the edge would close a loop.
    #[error("Circular dependency: {from} -> {to} would create a cycle")]
    CircularDependency {
        /// Proposed edge source / predecessor
        from: NodeId,
        /// Proposed edge target / successor
        to: NodeId,
    },

    /// Endpoints belong to different tenants.
    #[error("Node {node} belongs to tenant {actual}, expected {expected}")]
    CrossScope {
        /// Offending node
        node: NodeId,
        /// Tenant required by the operation
        expected: TenantId,
        /// Tenant the node belongs to
        actual: TenantId,
    },

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing data could not be interpreted.
    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    /// A record failed to serialize.
    #[error("Serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Edge id generation exhausted its retries.
    #[error("Id generation failed: {0}")]
    IdGeneration(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML could not be parsed or written.
    #[error("Invalid configuration file: {0}")]
    Parse(String),

    /// A value is out of its allowed range.
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Kebab-case field path
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing node or edge
    NotFound,
    /// Rejected input
    Validation,
    /// Structural invariant violation
    CircularDependency,
    /// Endpoints in different tenants
    CrossScope,
    /// Infrastructure failure
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::CrossScope => "CROSS_SCOPE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Error {
    /// Classify this error into the caller-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound(_) | Self::EdgeNotFound(_) => ErrorKind::NotFound,
            Self::SelfDependency(_)
            | Self::DuplicateEdge { .. }
            | Self::LagOutOfRange { .. }
            | Self::MultipleParents { .. }
            | Self::InvalidRelationship(_)
            | Self::Validation(_) => ErrorKind::Validation,
            Self::CircularDependency { .. } => ErrorKind::CircularDependency,
            Self::CrossScope { .. } => ErrorKind::CrossScope,
            Self::Storage(_) | Self::Config(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// A specialized Result type for trellis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One node's failure inside a background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Job name
    pub job: &'static str,
    /// Node the unit of work was for
    pub node: NodeId,
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl UnitFailure {
    /// Record a failed unit from the error that caused it.
    #[must_use]
    pub fn new(job: &'static str, node: NodeId, error: &Error) -> Self {
        Self {
            job,
            node,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {} ({})", self.job, self.node, self.message, self.kind)
    }
}

impl std::error::Error for UnitFailure {}
