//! Trellis - a relationship and dependency graph engine for project
//! portfolios.
//!
//! Work items ("nodes") are owned by a host system and read through
//! [`storage::NodeProvider`]. Trellis owns the edges between them:
//!
//! - **Relationships**: `PARENT_CHILD` hierarchy, `PROGRAM` membership and
//!   self-referential `MASTER` markers ([`graph::RelationshipManager`])
//! - **Dependencies**: typed scheduling edges with lag, criticality and
//!   impact ([`graph::DependencyGraphEngine`])
//!
//! On top of the edges it computes critical paths, delay cascades, network
//! structure, hierarchy and program roll-ups, and health scores, and keeps
//! derived results fresh with a background [`scheduler::RecomputeScheduler`].
//! [`engine::Engine`] wires every component over one pair of stores.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod analysis;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod id_generation;
pub mod schedule;
pub mod scheduler;
pub mod storage;

// Application context and CLI (needed by binary)
pub mod app;
pub mod cli;
pub mod output;
