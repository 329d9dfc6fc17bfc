//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use trellis::clock::ManualClock;
use trellis::config::EngineConfig;
use trellis::domain::Node;
use trellis::engine::Engine;
use trellis::scheduler::TracingNotifier;
use trellis::storage::in_memory::InMemoryStore;

/// Tenant used by every fixture
pub const TENANT: &str = "acme";

/// Fixed instant the manual clock starts at
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// `days` after [`epoch`]
pub fn day(days: i64) -> DateTime<Utc> {
    epoch() + Duration::days(days)
}

/// Active node in [`TENANT`]
pub fn node(id: &str) -> Node {
    Node::new(id, TENANT, id.to_uppercase())
}

/// Node scheduled over `[start, start + length)` days after the epoch
pub fn scheduled(id: &str, start: i64, length: i64) -> Node {
    node(id).with_schedule(day(start), day(start + length))
}

/// Engine over a fresh store with a manual clock at [`epoch`]
pub struct Harness {
    /// Backing store, shared with the engine
    pub store: Arc<InMemoryStore>,
    /// Clock driving the engine
    pub clock: ManualClock,
    /// Engine under test
    pub engine: Engine,
}

impl Harness {
    /// Harness with default configuration and the given nodes
    pub async fn with_nodes(nodes: Vec<Node>) -> Self {
        Self::with_config(nodes, EngineConfig::default()).await
    }

    /// Harness with a custom configuration
    pub async fn with_config(nodes: Vec<Node>, config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        for node in nodes {
            store.upsert_node(node).await;
        }
        let clock = ManualClock::new(epoch());
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            config,
            Arc::new(clock.clone()),
            Arc::new(TracingNotifier),
        )
        .expect("default config is valid");
        Self {
            store,
            clock,
            engine,
        }
    }
}
