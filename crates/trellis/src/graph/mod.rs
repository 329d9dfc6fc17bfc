//! Cycle-safe graph mutation and traversal.
//!
//! - [`CycleValidator`]: reachability check gating every structural write
//! - [`MutationGate`]: per-tenant serialization of read-validate-write sequences
//! - [`HierarchyTraversal`]: ancestor/descendant queries over `PARENT_CHILD`
//! - [`DependencyGraphEngine`]: dependency CRUD, critical path, delay cascade
//! - [`RelationshipManager`]: hierarchy, program and master writes

pub mod cycle;
pub mod dependency;
pub mod gate;
pub mod hierarchy;
pub mod relationships;

pub use cycle::CycleValidator;
pub use dependency::{
    CascadeResult, DependencyGraphEngine, ImpactAnalysis, ImpactedNode, NodeDelay,
};
pub use gate::MutationGate;
pub use hierarchy::HierarchyTraversal;
pub use relationships::RelationshipManager;
