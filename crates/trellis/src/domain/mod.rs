//! Domain types for the relationship and dependency graph engine.
//!
//! Nodes are work items owned by the host project-management system; the
//! engine reads them as snapshots. Edges come in two families:
//!
//! - [`RelationshipEdge`]: structural links (parent/child, program membership,
//!   master promotion), soft-deleted via `is_active`.
//! - [`DependencyEdge`]: scheduling links between a predecessor and a
//!   successor with a [`DependencyType`] and signed lag.
//!
//! [`MasterAggregate`] is the only derived record that lives in this module;
//! the other derived records belong to the analysis modules that compute them.

mod edges;
mod node;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use edges::{
    DependencyEdge, DependencyMetadata, DependencyStatus, DependencyType, DependencyUpdate,
    EdgeKind, Impact, NewDependency, RelationshipEdge, RelationshipMetadata, RelationshipType,
    ViolationRecord, ViolationSeverity,
};
pub use node::{
    MasterAggregate, Node, NodeFilter, NodeStatus, Priority, QualityIndicators, TeamIndicators,
    VelocityTrend,
};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a work item ("project") in the host system
    NodeId
);

string_id!(
    /// Identifier of the tenant that owns a node
    TenantId
);

string_id!(
    /// Identifier of a relationship or dependency edge
    EdgeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_and_convert() {
        let id = NodeId::from("proj-1");
        assert_eq!(id.as_str(), "proj-1");
        assert_eq!(id.to_string(), "proj-1");
        assert_eq!(NodeId::new(String::from("proj-1")), id);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = EdgeId::new("dep-a3f8");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dep-a3f8\"");

        let back: EdgeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ids_order_lexicographically() {
        let mut ids = vec![NodeId::from("c"), NodeId::from("a"), NodeId::from("b")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("c")]);
    }
}
