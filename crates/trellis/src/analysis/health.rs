//! Per-node and portfolio health scoring.
//!
//! A node's score blends five sub-scores, each clamped to 0-100:
//!
//! | dimension | weight |
//! |---|---|
//! | schedule | 0.25 |
//! | budget | 0.25 |
//! | progress | 0.20 |
//! | quality | 0.15 |
//! | team | 0.15 |
//!
//! Nodes with hierarchy children are scored on their rolled-up budget, cost,
//! progress and schedule window.

use super::aggregation::AggregationEngine;
use crate::clock::Clock;
use crate::domain::{
    Node, NodeFilter, NodeId, NodeStatus, QualityIndicators, TeamIndicators, VelocityTrend,
};
use crate::error::{Error, Result};
use crate::storage::NodeProvider;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const SCHEDULE_WEIGHT: f64 = 0.25;
const BUDGET_WEIGHT: f64 = 0.25;
const PROGRESS_WEIGHT: f64 = 0.20;
const QUALITY_WEIGHT: f64 = 0.15;
const TEAM_WEIGHT: f64 = 0.15;

/// Number of historical scores the trend looks at
pub const TREND_WINDOW: usize = 5;

/// Slope beyond which a trend counts as moving
const TREND_THRESHOLD: f64 = 2.0;

/// Direction of a node's recent scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTrend {
    /// Slope above 2 points per sample
    Improving,
    /// Flat, or too little history
    Stable,
    /// Slope below -2 points per sample
    Declining,
}

/// Coarse band of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    /// 80 and above
    Healthy,
    /// 60 to 79
    Warning,
    /// Below 60
    Critical,
}

impl fmt::Display for HealthTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Improving => write!(f, "IMPROVING"),
            Self::Stable => write!(f, "STABLE"),
            Self::Declining => write!(f, "DECLINING"),
        }
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl HealthBand {
    /// Band for a final score
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => Self::Healthy,
            60..=79 => Self::Warning,
            _ => Self::Critical,
        }
    }
}

/// The five dimensions behind a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    /// Overdue days and lag behind expected progress
    pub schedule: f64,
    /// Cost overrun tiers
    pub budget: f64,
    /// Status-conditioned progress
    pub progress: f64,
    /// Quality indicators around a baseline of 80
    pub quality: f64,
    /// Team indicators around a baseline of 75
    pub team: f64,
}

impl SubScores {
    fn weighted(&self) -> f64 {
        self.schedule * SCHEDULE_WEIGHT
            + self.budget * BUDGET_WEIGHT
            + self.progress * PROGRESS_WEIGHT
            + self.quality * QUALITY_WEIGHT
            + self.team * TEAM_WEIGHT
    }
}

/// Health of one node at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    /// Scored node
    pub node_id: NodeId,
    /// Final score, 0-100
    pub score: u32,
    /// Components of the score
    pub sub_scores: SubScores,
    /// Direction over the supplied history
    pub trend: HealthTrend,
    /// Band of `score`
    pub band: HealthBand,
    /// When it was computed
    pub computed_at: DateTime<Utc>,
}

/// Node counts per band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BandDistribution {
    /// Nodes scoring 80+
    pub healthy: usize,
    /// Nodes scoring 60-79
    pub warning: usize,
    /// Nodes scoring below 60
    pub critical: usize,
}

/// Weighted health across many nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioHealth {
    /// Priority- and budget-weighted mean score; 0 when empty
    pub score: f64,
    /// Nodes included
    pub node_count: usize,
    /// Counts per band
    pub distribution: BandDistribution,
    /// Nodes in the critical band, ordered by id
    pub critical_nodes: Vec<NodeId>,
    /// When it was computed
    pub computed_at: DateTime<Utc>,
}

#[allow(clippy::cast_precision_loss)]
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

/// Schedule sub-score.
#[must_use]
pub fn schedule_score(node: &Node, now: DateTime<Utc>) -> f64 {
    let mut score: f64 = 100.0;
    let completed = node.status == NodeStatus::Completed;

    if let Some(end) = node.end_date {
        if completed {
            if now < end {
                score += 10.0;
            }
        } else if now > end {
            let overdue = days_between(end, now).floor();
            score -= (overdue * 2.0).min(50.0);
        }
    }

    if !completed {
        if let (Some(start), Some(end)) = (node.start_date, node.end_date) {
            if now > start && end > start {
                let expected = (days_between(start, now) / days_between(start, end) * 100.0)
                    .clamp(0.0, 100.0);
                let gap = expected - node.progress_percent;
                score -= if gap > 20.0 {
                    30.0
                } else if gap > 10.0 {
                    15.0
                } else if gap > 5.0 {
                    5.0
                } else {
                    0.0
                };
            }
        }
    }
    score.clamp(0.0, 100.0)
}

/// Budget sub-score, tiered on the cost overrun percentage.
#[must_use]
pub fn budget_score(node: &Node) -> f64 {
    if node.budget <= 0.0 {
        return 100.0;
    }
    let variance = (node.actual_cost - node.budget) / node.budget * 100.0;
    let score = if variance <= -10.0 {
        100.0
    } else if variance <= 0.0 {
        95.0
    } else if variance <= 5.0 {
        85.0
    } else if variance <= 10.0 {
        70.0
    } else if variance <= 20.0 {
        50.0
    } else {
        (50.0 - variance).max(0.0)
    };
    score.clamp(0.0, 100.0)
}

/// Progress sub-score.
#[must_use]
pub fn progress_score(node: &Node) -> f64 {
    let score = match node.status {
        NodeStatus::Completed => 100.0,
        NodeStatus::Cancelled => 0.0,
        NodeStatus::Active if node.progress_percent >= 25.0 => 80.0,
        NodeStatus::Active if node.progress_percent > 0.0 => 75.0,
        NodeStatus::AtRisk => 50.0,
        NodeStatus::Delayed => 40.0,
        NodeStatus::OnHold => 60.0,
        NodeStatus::Active | NodeStatus::Planning => 70.0,
    };
    f64::clamp(score, 0.0, 100.0)
}

/// Quality sub-score. Absent indicators leave the baseline of 80 alone.
#[must_use]
pub fn quality_score(quality: &QualityIndicators) -> f64 {
    let mut score: f64 = 80.0;
    if let Some(rate) = quality.defect_rate {
        if rate < 2.0 {
            score += 10.0;
        } else if rate > 10.0 {
            score -= 20.0;
        } else if rate > 5.0 {
            score -= 10.0;
        }
    }
    if let Some(coverage) = quality.test_coverage {
        if coverage >= 80.0 {
            score += 10.0;
        } else if coverage < 50.0 {
            score -= 15.0;
        }
    }
    if let Some(satisfaction) = quality.customer_satisfaction {
        if satisfaction >= 4.5 {
            score += 10.0;
        } else if satisfaction < 3.0 {
            score -= 15.0;
        }
    }
    score.clamp(0.0, 100.0)
}

/// Team sub-score. Absent indicators leave the baseline of 75 alone.
#[must_use]
pub fn team_score(team: &TeamIndicators) -> f64 {
    let mut score: f64 = 75.0;
    if let Some(satisfaction) = team.satisfaction {
        if satisfaction >= 8.0 {
            score += 10.0;
        } else if satisfaction < 5.0 {
            score -= 15.0;
        }
    }
    if let Some(size) = team.team_size {
        match size {
            3..=9 => score += 5.0,
            16.. => score -= 5.0,
            0..=1 => score -= 10.0,
            _ => {}
        }
    }
    if let Some(turnover) = team.turnover_rate {
        if turnover > 20.0 {
            score -= 20.0;
        } else if turnover > 10.0 {
            score -= 10.0;
        } else if turnover < 5.0 {
            score += 5.0;
        }
    }
    match team.velocity_trend {
        Some(VelocityTrend::Improving) => score += 10.0,
        Some(VelocityTrend::Declining) => score -= 10.0,
        Some(VelocityTrend::Stable) | None => {}
    }
    score.clamp(0.0, 100.0)
}

/// Every sub-score for `node` at `now`
#[must_use]
pub fn sub_scores(node: &Node, now: DateTime<Utc>) -> SubScores {
    SubScores {
        schedule: schedule_score(node, now),
        budget: budget_score(node),
        progress: progress_score(node),
        quality: quality_score(&node.quality),
        team: team_score(&node.team),
    }
}

/// Final integer score for a set of sub-scores
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn final_score(scores: &SubScores) -> u32 {
    scores.weighted().round().clamp(0.0, 100.0) as u32
}

/// Classify the last [`TREND_WINDOW`] scores by least-squares slope.
///
/// Fewer than two samples is `Stable`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify_trend(history: &[f64]) -> HealthTrend {
    let window = &history[history.len().saturating_sub(TREND_WINDOW)..];
    let n = window.len();
    if n < 2 {
        return HealthTrend::Stable;
    }

    let count = n as f64;
    let mean_x = (count - 1.0) / 2.0;
    let mean_y = window.iter().sum::<f64>() / count;
    let (covariance, variance) = window.iter().enumerate().fold((0.0, 0.0), |(cov, var), (i, y)| {
        let dx = i as f64 - mean_x;
        (cov + dx * (y - mean_y), var + dx * dx)
    });
    let slope = covariance / variance;

    if slope > TREND_THRESHOLD {
        HealthTrend::Improving
    } else if slope < -TREND_THRESHOLD {
        HealthTrend::Declining
    } else {
        HealthTrend::Stable
    }
}

/// Score `node` at `now` with the given prior scores.
#[must_use]
pub fn assess(node: &Node, history: &[f64], now: DateTime<Utc>) -> HealthRecord {
    let sub_scores = sub_scores(node, now);
    let score = final_score(&sub_scores);
    HealthRecord {
        node_id: node.id.clone(),
        score,
        sub_scores,
        trend: classify_trend(history),
        band: HealthBand::from_score(score),
        computed_at: now,
    }
}

/// Portfolio weight: priority multiplier times `log10(max(10000, budget)) / 6`
#[must_use]
pub fn portfolio_weight(node: &Node) -> f64 {
    node.priority.weight_multiplier() * node.budget.max(10_000.0).log10() / 6.0
}

/// Weighted mean over scored nodes.
#[must_use]
pub fn portfolio(scored: &[(Node, HealthRecord)], now: DateTime<Utc>) -> PortfolioHealth {
    let mut distribution = BandDistribution::default();
    let mut critical_nodes = Vec::new();
    let mut weighted = 0.0;
    let mut weights = 0.0;

    for (node, record) in scored {
        let weight = portfolio_weight(node);
        weighted += f64::from(record.score) * weight;
        weights += weight;
        match record.band {
            HealthBand::Healthy => distribution.healthy += 1,
            HealthBand::Warning => distribution.warning += 1,
            HealthBand::Critical => {
                distribution.critical += 1;
                critical_nodes.push(node.id.clone());
            }
        }
    }
    critical_nodes.sort();

    PortfolioHealth {
        score: if weights > 0.0 { weighted / weights } else { 0.0 },
        node_count: scored.len(),
        distribution,
        critical_nodes,
        computed_at: now,
    }
}

/// Scores nodes against the live stores.
pub struct HealthScorer {
    nodes: Arc<dyn NodeProvider>,
    aggregation: Arc<AggregationEngine>,
    clock: Arc<dyn Clock>,
}

impl HealthScorer {
    /// Create a scorer over the given collaborators
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        aggregation: Arc<AggregationEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            nodes,
            aggregation,
            clock,
        }
    }

    /// Node as scored: rolled-up figures when it has hierarchy children
    async fn scored_view(&self, node: Node) -> Result<Node> {
        let rollup = self.aggregation.aggregate(&node.id).await?;
        if rollup.total_sub_nodes == 0 {
            return Ok(node);
        }
        Ok(Node {
            budget: rollup.budget,
            actual_cost: rollup.cost,
            progress_percent: rollup.progress,
            start_date: rollup.earliest_start,
            end_date: rollup.latest_end,
            ..node
        })
    }

    /// Score one node given its prior scores, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` when `id` does not exist.
    pub async fn node_health(&self, id: &NodeId, history: &[f64]) -> Result<HealthRecord> {
        let node = self
            .nodes
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;
        self.assess_node(node, history).await
    }

    /// Score an already-fetched node.
    ///
    /// # Errors
    ///
    /// Propagates aggregation failures.
    pub async fn assess_node(&self, node: Node, history: &[f64]) -> Result<HealthRecord> {
        let view = self.scored_view(node).await?;
        let record = assess(&view, history, self.clock.now());
        tracing::debug!(node = %record.node_id, score = record.score, trend = ?record.trend, "Scored node");
        Ok(record)
    }

    /// Portfolio health over every node matching `filter`, without history.
    ///
    /// Nodes that fail to score are logged and left out.
    ///
    /// # Errors
    ///
    /// Propagates node listing failures.
    pub async fn portfolio_health(&self, filter: &NodeFilter) -> Result<PortfolioHealth> {
        let nodes = self.nodes.list_nodes(filter).await?;
        let mut scored = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.assess_node(node.clone(), &[]).await {
                Ok(record) => scored.push((node, record)),
                Err(error) => tracing::warn!(node = %node.id, %error, "Skipping node in portfolio"),
            }
        }
        Ok(portfolio(&scored, self.clock.now()))
    }

    /// Time source used for stamps
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for HealthScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthScorer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use chrono::TimeZone;
    use rstest::rstest;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    #[rstest]
    #[case::under_by_20(1000.0, 800.0, 100.0)]
    #[case::on_budget(1000.0, 1000.0, 95.0)]
    #[case::over_by_5(1000.0, 1050.0, 85.0)]
    #[case::over_by_10(1000.0, 1100.0, 70.0)]
    #[case::over_by_20(1000.0, 1200.0, 50.0)]
    #[case::over_by_30(1000.0, 1300.0, 20.0)]
    #[case::over_by_80(1000.0, 1800.0, 0.0)]
    #[case::no_budget(0.0, 500.0, 100.0)]
    fn test_budget_tiers(#[case] budget: f64, #[case] cost: f64, #[case] expected: f64) {
        let node = Node::new("a", "t1", "A").with_budget(budget, cost);
        assert!((budget_score(&node) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_overdue_is_capped() {
        let node = Node::new("a", "t1", "A")
            .with_schedule(day(1), day(2))
            .with_progress(100.0);
        // 3 days late
        assert!((schedule_score(&node, day(5)) - 94.0).abs() < 1e-9);
        // 29 days late caps at 50
        assert!((schedule_score(&node, day(31)) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_behind_expected_progress() {
        // Halfway through the window with 20% done: gap 30
        let node = Node::new("a", "t1", "A")
            .with_schedule(day(1), day(21))
            .with_progress(20.0);
        assert!((schedule_score(&node, day(11)) - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_completed_early_bonus_is_clamped() {
        let node = Node::new("a", "t1", "A")
            .with_schedule(day(1), day(21))
            .with_status(NodeStatus::Completed);
        assert!((schedule_score(&node, day(10)) - 100.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(NodeStatus::Completed, 0.0, 100.0)]
    #[case(NodeStatus::Cancelled, 50.0, 0.0)]
    #[case(NodeStatus::Active, 30.0, 80.0)]
    #[case(NodeStatus::Active, 10.0, 75.0)]
    #[case(NodeStatus::Active, 0.0, 70.0)]
    #[case(NodeStatus::AtRisk, 30.0, 50.0)]
    #[case(NodeStatus::Delayed, 30.0, 40.0)]
    #[case(NodeStatus::OnHold, 30.0, 60.0)]
    fn test_progress_score(#[case] status: NodeStatus, #[case] progress: f64, #[case] expected: f64) {
        let node = Node::new("a", "t1", "A")
            .with_status(status)
            .with_progress(progress);
        assert!((progress_score(&node) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_absent_indicators_keep_baselines() {
        assert!((quality_score(&QualityIndicators::default()) - 80.0).abs() < 1e-9);
        assert!((team_score(&TeamIndicators::default()) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_indicators_nudge_baselines() {
        let quality = QualityIndicators {
            defect_rate: Some(12.0),
            test_coverage: Some(85.0),
            customer_satisfaction: None,
        };
        assert!((quality_score(&quality) - 70.0).abs() < 1e-9);

        let team = TeamIndicators {
            satisfaction: Some(9.0),
            team_size: Some(5),
            turnover_rate: Some(2.0),
            velocity_trend: Some(VelocityTrend::Improving),
        };
        assert!((team_score(&team) - 100.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(&[], HealthTrend::Stable)]
    #[case(&[50.0], HealthTrend::Stable)]
    #[case(&[50.0, 60.0, 70.0], HealthTrend::Improving)]
    #[case(&[80.0, 70.0, 60.0, 50.0], HealthTrend::Declining)]
    #[case(&[70.0, 71.0, 69.0, 70.0], HealthTrend::Stable)]
    // Only the last five samples count
    #[case(&[0.0, 100.0, 60.0, 60.0, 60.0, 60.0, 60.0], HealthTrend::Stable)]
    fn test_classify_trend(#[case] history: &[f64], #[case] expected: HealthTrend) {
        assert_eq!(classify_trend(history), expected);
    }

    #[rstest]
    #[case(100, HealthBand::Healthy)]
    #[case(80, HealthBand::Healthy)]
    #[case(79, HealthBand::Warning)]
    #[case(60, HealthBand::Warning)]
    #[case(59, HealthBand::Critical)]
    fn test_bands(#[case] score: u32, #[case] band: HealthBand) {
        assert_eq!(HealthBand::from_score(score), band);
    }

    #[test]
    fn test_final_score_weights() {
        let scores = SubScores {
            schedule: 100.0,
            budget: 70.0,
            progress: 70.0,
            quality: 80.0,
            team: 75.0,
        };
        // 25 + 17.5 + 14 + 12 + 11.25 = 79.75
        assert_eq!(final_score(&scores), 80);
    }

    #[test]
    fn test_portfolio_weighting() {
        let big = Node::new("big", "t1", "Big")
            .with_priority(Priority::Critical)
            .with_budget(1_000_000.0, 0.0);
        let small = Node::new("small", "t1", "Small").with_priority(Priority::Low);

        // weights: 3 * 6/6 = 3 and 1 * 4/6
        assert!((portfolio_weight(&big) - 3.0).abs() < 1e-9);
        assert!((portfolio_weight(&small) - 4.0 / 6.0).abs() < 1e-9);

        let record = |node: &Node, score: u32| HealthRecord {
            node_id: node.id.clone(),
            score,
            sub_scores: sub_scores(node, day(1)),
            trend: HealthTrend::Stable,
            band: HealthBand::from_score(score),
            computed_at: day(1),
        };
        let scored = vec![
            (big.clone(), record(&big, 90)),
            (small.clone(), record(&small, 40)),
        ];
        let result = portfolio(&scored, day(1));
        let expected = (90.0 * 3.0 + 40.0 * 4.0 / 6.0) / (3.0 + 4.0 / 6.0);
        assert!((result.score - expected).abs() < 1e-9);
        assert_eq!(result.distribution.healthy, 1);
        assert_eq!(result.critical_nodes, vec![NodeId::from("small")]);
    }

    #[test]
    fn test_empty_portfolio_scores_zero() {
        let result = portfolio(&[], day(1));
        assert!(result.score.abs() < f64::EPSILON);
        assert_eq!(result.node_count, 0);
    }
}
