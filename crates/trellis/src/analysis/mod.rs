//! Read-only analyses over the graph: network structure, roll-ups and health.

pub mod aggregation;
pub mod health;
pub mod network;

pub use aggregation::{AggregationEngine, DerivedMetrics, ProgramMetrics, RollupMetrics};
pub use health::{
    BandDistribution, HealthBand, HealthRecord, HealthScorer, HealthTrend, PortfolioHealth,
    SubScores,
};
pub use network::{Bottleneck, NetworkAnalyzer, NetworkSnapshot, NetworkSummary, edge_weight};
