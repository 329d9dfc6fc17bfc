//! Periodic recomputation of derived state.
//!
//! [`RecomputeScheduler`] runs four independent jobs. Each pass fetches its
//! work set, fans out one unit per node or edge, commits every unit that
//! succeeds, records the ones that fail, then sweeps expired cache entries.
//!
//! ```text
//! Idle -> Running -> (Succeeded | PartialFailure) -> Idle
//! ```
//!
//! A tick that finds its job still `Running` is skipped. All jobs are
//! re-derivations, so skipped or coalesced ticks lose nothing.

pub mod cache;
pub mod jobs;
pub mod notify;
pub mod violations;

pub use cache::{CacheEntry, TtlCache};
pub use jobs::{JobKind, JobOutcome, JobReport, JobState};
pub use notify::{Notifier, NotifyError, TracingNotifier};
pub use violations::Violation;

use crate::analysis::aggregation::AggregationEngine;
use crate::analysis::health::{self, HealthRecord, HealthScorer, PortfolioHealth};
use crate::analysis::ProgramMetrics;
use crate::clock::Clock;
use crate::config::{HealthConfig, SchedulerConfig};
use crate::domain::{
    DependencyEdge, DependencyUpdate, EdgeId, MasterAggregate, Node, NodeFilter, NodeId,
    RelationshipType,
};
use crate::error::{Error, Result, UnitFailure};
use crate::storage::{GraphStore, NodeProvider};
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Actor recorded on edges the violation scan annotates
const SCHEDULER_ACTOR: &str = "scheduler";

/// Resets a job to `Idle` when its pass ends, however it ends.
///
/// A pass that aborts before `finish` keeps the previous outcome.
struct RunningGuard<'a> {
    states: &'a Mutex<HashMap<JobKind, JobState>>,
    job: JobKind,
    last: Option<JobOutcome>,
}

impl RunningGuard<'_> {
    fn finish(&mut self, outcome: JobOutcome) {
        self.last = Some(outcome);
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(self.job, JobState::Idle { last: self.last });
    }
}

struct SchedulerInner {
    nodes: Arc<dyn NodeProvider>,
    store: Arc<dyn GraphStore>,
    aggregation: Arc<AggregationEngine>,
    health: Arc<HealthScorer>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    history_len: usize,
    states: Mutex<HashMap<JobKind, JobState>>,
    history: Mutex<HashMap<NodeId, VecDeque<f64>>>,
    masters: TtlCache<NodeId, MasterAggregate>,
    programs: TtlCache<NodeId, ProgramMetrics>,
    health_records: TtlCache<NodeId, HealthRecord>,
    portfolio: TtlCache<(), PortfolioHealth>,
    violations: TtlCache<EdgeId, Violation>,
}

/// Background recomputation with a TTL cache of results.
///
/// Cloning yields a handle to the same scheduler.
#[derive(Clone)]
pub struct RecomputeScheduler {
    inner: Arc<SchedulerInner>,
}

/// Stops the timer tasks started by [`RecomputeScheduler::start`]
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop future ticks and wait for any pass in progress to finish
    pub async fn shutdown(self) {
        // Receivers are gone only if every task already exited
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(error) = task.await {
                tracing::warn!(%error, "Scheduler task ended abnormally");
            }
        }
    }
}

impl RecomputeScheduler {
    /// Create a scheduler over the given collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        store: Arc<dyn GraphStore>,
        aggregation: Arc<AggregationEngine>,
        health: Arc<HealthScorer>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        health_config: HealthConfig,
    ) -> Self {
        let ttl = config.cache_ttl();
        Self {
            inner: Arc::new(SchedulerInner {
                nodes,
                store,
                aggregation,
                health,
                notifier,
                clock,
                config,
                history_len: health_config.history_len,
                states: Mutex::new(HashMap::new()),
                history: Mutex::new(HashMap::new()),
                masters: TtlCache::new(ttl),
                programs: TtlCache::new(ttl),
                health_records: TtlCache::new(ttl),
                portfolio: TtlCache::new(ttl),
                violations: TtlCache::new(ttl),
            }),
        }
    }

    /// Current state of a job
    #[must_use]
    pub fn job_state(&self, job: JobKind) -> JobState {
        let states = self.inner.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(&job).copied().unwrap_or_default()
    }

    /// Mark `job` running, or `None` if it already is
    fn try_begin(&self, job: JobKind) -> Option<RunningGuard<'_>> {
        let mut states = self.inner.states.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = states.get(&job).copied().unwrap_or_default();
        if previous.is_running() {
            return None;
        }
        states.insert(job, JobState::Running);
        Some(RunningGuard {
            states: &self.inner.states,
            job,
            last: previous.last_outcome(),
        })
    }

    /// Run one full pass of `job`.
    ///
    /// Unit failures are collected in the report. Only a failure to fetch the
    /// work set itself is returned as an error.
    ///
    /// # Errors
    ///
    /// Propagates store failures while listing the work set.
    pub async fn run_job(&self, job: JobKind) -> Result<JobReport> {
        let started_at = self.inner.clock.now();
        let Some(mut guard) = self.try_begin(job) else {
            tracing::debug!(%job, "Previous pass still running; skipping tick");
            return Ok(JobReport::skipped(job, started_at));
        };

        let units = match job {
            JobKind::MasterAggregation => self.master_pass().await?,
            JobKind::ProgramMetrics => self.program_pass().await?,
            JobKind::ViolationScan => self.violation_pass().await?,
            JobKind::PortfolioCache => self.portfolio_pass().await?,
        };

        let mut report = JobReport::from_units(job, units, started_at);
        for failure in &report.failures {
            tracing::warn!(job = failure.job, node = %failure.node, kind = %failure.kind, "{}", failure.message);
        }
        report.swept = self.sweep().await;
        report.finished_at = self.inner.clock.now();
        guard.finish(report.outcome);

        tracing::info!(
            %job,
            outcome = ?report.outcome,
            succeeded = report.succeeded,
            failed = report.failed,
            swept = report.swept,
            "Job pass finished"
        );
        Ok(report)
    }

    /// Run every job once, in order
    ///
    /// # Errors
    ///
    /// Stops at the first job whose work set could not be listed.
    pub async fn run_all(&self) -> Result<Vec<JobReport>> {
        let mut reports = Vec::with_capacity(JobKind::ALL.len());
        for job in JobKind::ALL {
            reports.push(self.run_job(job).await?);
        }
        Ok(reports)
    }

    /// Remove expired entries from every cache
    pub async fn sweep(&self) -> usize {
        let now = self.inner.clock.now();
        self.inner.masters.sweep(now).await
            + self.inner.programs.sweep(now).await
            + self.inner.health_records.sweep(now).await
            + self.inner.portfolio.sweep(now).await
            + self.inner.violations.sweep(now).await
    }

    // ========== Passes ==========

    async fn master_pass(&self) -> Result<Vec<std::result::Result<(), UnitFailure>>> {
        let mut masters: Vec<NodeId> = self
            .inner
            .store
            .active_relationships(RelationshipType::Master)
            .await?
            .into_iter()
            .map(|edge| edge.source)
            .collect();
        masters.sort();
        masters.dedup();

        let job = JobKind::MasterAggregation.name();
        Ok(join_all(masters.into_iter().map(|master| async move {
            let aggregate = self
                .inner
                .aggregation
                .refresh_master(&master)
                .await
                .map_err(|error| UnitFailure::new(job, master.clone(), &error))?;
            self.inner
                .masters
                .insert(master, aggregate, self.inner.clock.now())
                .await;
            Ok::<(), UnitFailure>(())
        }))
        .await)
    }

    async fn program_pass(&self) -> Result<Vec<std::result::Result<(), UnitFailure>>> {
        let mut programs: Vec<NodeId> = self
            .inner
            .store
            .active_relationships(RelationshipType::Program)
            .await?
            .into_iter()
            .map(|edge| edge.source)
            .collect();
        programs.sort();
        programs.dedup();

        let job = JobKind::ProgramMetrics.name();
        Ok(join_all(programs.into_iter().map(|program| async move {
            let metrics = self
                .inner
                .aggregation
                .program_metrics(&program)
                .await
                .map_err(|error| UnitFailure::new(job, program.clone(), &error))?;
            self.inner
                .programs
                .insert(program, metrics, self.inner.clock.now())
                .await;
            Ok::<(), UnitFailure>(())
        }))
        .await)
    }

    async fn violation_pass(&self) -> Result<Vec<std::result::Result<(), UnitFailure>>> {
        let edges = self.inner.store.active_dependencies().await?;
        let job = JobKind::ViolationScan.name();
        Ok(join_all(edges.into_iter().map(|edge| async move {
            let node = edge.successor.clone();
            self.scan_edge(edge)
                .await
                .map_err(|error| UnitFailure::new(job, node, &error))
        }))
        .await)
    }

    async fn require_node(&self, id: &NodeId) -> Result<Node> {
        self.inner
            .nodes
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    async fn scan_edge(&self, edge: DependencyEdge) -> Result<()> {
        let predecessor = self.require_node(&edge.predecessor).await?;
        let successor = self.require_node(&edge.successor).await?;
        let now = self.inner.clock.now();

        let Some(violation) = violations::check(&edge, &predecessor, &successor, now) else {
            self.inner.violations.remove(&edge.id).await;
            return Ok(());
        };

        if violation.severity.is_alerting() {
            if let Err(error) = self.inner.notifier.notify(&violation).await {
                tracing::warn!(edge = %edge.id, %error, "Could not deliver violation alert");
            }
            let update = DependencyUpdate {
                last_violation: Some(violation.record()),
                ..DependencyUpdate::default()
            };
            self.inner
                .store
                .update_dependency(&edge.id, update, Some(SCHEDULER_ACTOR))
                .await?;
        }
        self.inner.violations.insert(edge.id, violation, now).await;
        Ok(())
    }

    async fn portfolio_pass(&self) -> Result<Vec<std::result::Result<(), UnitFailure>>> {
        let nodes = self.inner.nodes.list_nodes(&NodeFilter::active()).await?;
        let job = JobKind::PortfolioCache.name();

        let outcomes = join_all(nodes.into_iter().map(|node| async move {
            let history = self.history_of(&node.id);
            let record = self
                .inner
                .health
                .assess_node(node.clone(), &history)
                .await
                .map_err(|error| UnitFailure::new(job, node.id.clone(), &error))?;
            Ok::<_, UnitFailure>((node, record))
        }))
        .await;

        let now = self.inner.clock.now();
        let mut scored = Vec::new();
        let mut units = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok((node, record)) => {
                    self.push_history(&node.id, record.score);
                    self.inner
                        .health_records
                        .insert(node.id.clone(), record.clone(), now)
                        .await;
                    scored.push((node, record));
                    units.push(Ok(()));
                }
                Err(failure) => units.push(Err(failure)),
            }
        }

        scored.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));
        self.inner
            .portfolio
            .insert((), health::portfolio(&scored, now), now)
            .await;
        Ok(units)
    }

    // ========== History ==========

    fn history_of(&self, id: &NodeId) -> Vec<f64> {
        let history = self.inner.history.lock().unwrap_or_else(PoisonError::into_inner);
        history
            .get(id)
            .map(|scores| scores.iter().copied().collect())
            .unwrap_or_default()
    }

    fn push_history(&self, id: &NodeId, score: u32) {
        let mut history = self.inner.history.lock().unwrap_or_else(PoisonError::into_inner);
        let scores = history.entry(id.clone()).or_default();
        scores.push_back(f64::from(score));
        while scores.len() > self.inner.history_len {
            scores.pop_front();
        }
    }

    /// Scores recorded for `id` by past portfolio passes, oldest first
    #[must_use]
    pub fn health_history(&self, id: &NodeId) -> Vec<f64> {
        self.history_of(id)
    }

    // ========== Read paths ==========

    /// Fresh master aggregate from the last pass
    pub async fn cached_master_aggregate(&self, id: &NodeId) -> Option<MasterAggregate> {
        self.inner.masters.get(id, self.inner.clock.now()).await
    }

    /// Fresh program figures from the last pass
    pub async fn cached_program_metrics(&self, id: &NodeId) -> Option<ProgramMetrics> {
        self.inner.programs.get(id, self.inner.clock.now()).await
    }

    /// Fresh health record from the last portfolio pass
    pub async fn cached_health(&self, id: &NodeId) -> Option<HealthRecord> {
        self.inner.health_records.get(id, self.inner.clock.now()).await
    }

    /// Fresh portfolio health from the last pass
    pub async fn cached_portfolio(&self) -> Option<PortfolioHealth> {
        self.inner.portfolio.get(&(), self.inner.clock.now()).await
    }

    /// Fresh violations, most severe first, ties by edge id
    pub async fn cached_violations(&self) -> Vec<Violation> {
        let mut found = self.inner.violations.values(self.inner.clock.now()).await;
        found.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.edge_id.cmp(&b.edge_id))
        });
        found
    }

    // ========== Timers ==========

    /// Spawn one timer task per job on the current runtime.
    ///
    /// Each task runs a pass immediately and then on its configured
    /// interval; ticks missed while a pass runs are skipped.
    #[must_use]
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let config = self.inner.config;
        let tasks = JobKind::ALL
            .into_iter()
            .map(|job| {
                let period = match job {
                    JobKind::MasterAggregation => config.master_aggregation_interval(),
                    JobKind::ProgramMetrics => config.program_metrics_interval(),
                    JobKind::ViolationScan => config.violation_scan_interval(),
                    JobKind::PortfolioCache => config.portfolio_cache_interval(),
                };
                let scheduler = self.clone();
                let mut receiver = receiver.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                if let Err(error) = scheduler.run_job(job).await {
                                    tracing::warn!(%job, %error, "Job pass aborted");
                                }
                            }
                            changed = receiver.changed() => {
                                if changed.is_err() || *receiver.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                    tracing::debug!(%job, "Scheduler task stopped");
                })
            })
            .collect();

        tracing::info!(jobs = JobKind::ALL.len(), "Recompute scheduler started");
        SchedulerHandle { shutdown, tasks }
    }
}

impl std::fmt::Debug for RecomputeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecomputeScheduler")
            .field("config", &self.inner.config)
            .field("history_len", &self.inner.history_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::domain::{
        DependencyType, NewDependency, NodeStatus, RelationshipMetadata, ViolationSeverity,
    };
    use crate::storage::in_memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 0, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct FailingNotifier {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _violation: &Violation) -> std::result::Result<(), NotifyError> {
            *self.calls.lock().unwrap() += 1;
            Err(NotifyError("mailbox full".to_string()))
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: ManualClock,
        scheduler: RecomputeScheduler,
    }

    fn fixture(notifier: Arc<dyn Notifier>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(day(5));
        let config = EngineConfig::default();
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let aggregation = Arc::new(AggregationEngine::new(
            store.clone(),
            store.clone(),
            Arc::clone(&clock_arc),
            config.traversal.max_depth,
        ));
        let health = Arc::new(HealthScorer::new(
            store.clone(),
            Arc::clone(&aggregation),
            Arc::clone(&clock_arc),
        ));
        let scheduler = RecomputeScheduler::new(
            store.clone(),
            store.clone(),
            aggregation,
            health,
            notifier,
            clock_arc,
            config.scheduler,
            config.health,
        );
        Fixture {
            store,
            clock,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_violation_alert_failure_keeps_record() {
        let notifier = Arc::new(FailingNotifier::default());
        let f = fixture(notifier.clone());
        f.store
            .upsert_node(Node::new("p", "t1", "P").with_schedule(day(1), day(20)))
            .await;
        f.store
            .upsert_node(
                Node::new("s", "t1", "S")
                    .with_schedule(day(2), day(25))
                    .with_status(NodeStatus::OnHold),
            )
            .await;
        let edge = f
            .store
            .insert_dependency(NewDependency::new("p", "s", DependencyType::FinishToStart), None)
            .await
            .unwrap();

        let report = f.scheduler.run_job(JobKind::ViolationScan).await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Succeeded);
        assert_eq!(*notifier.calls.lock().unwrap(), 1);

        let stored = f.store.get_dependency(&edge.id).await.unwrap().unwrap();
        let record = stored.metadata.last_violation.unwrap();
        assert_eq!(record.severity, ViolationSeverity::Critical);
        assert_eq!(stored.metadata.updated_by.as_deref(), Some(SCHEDULER_ACTOR));

        let cached = f.scheduler.cached_violations().await;
        assert_eq!(cached.len(), 1);
        assert!((cached[0].violation_days - 18.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_failure_commits_successes() {
        let f = fixture(Arc::new(TracingNotifier));
        f.store.upsert_node(Node::new("prog", "t1", "Program")).await;
        f.store.upsert_node(Node::new("member", "t1", "Member")).await;
        for program in ["prog", "ghost"] {
            f.store
                .insert_relationship(
                    &NodeId::from(program),
                    &NodeId::from("member"),
                    RelationshipType::Program,
                    RelationshipMetadata::default(),
                )
                .await
                .unwrap();
        }

        let report = f.scheduler.run_job(JobKind::ProgramMetrics).await.unwrap();
        assert_eq!(report.outcome, JobOutcome::PartialFailure);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures[0].node, NodeId::from("ghost"));
        assert!(f
            .scheduler
            .cached_program_metrics(&NodeId::from("prog"))
            .await
            .is_some());
        assert_eq!(
            f.scheduler.job_state(JobKind::ProgramMetrics),
            JobState::Idle {
                last: Some(JobOutcome::PartialFailure)
            }
        );
    }

    #[tokio::test]
    async fn test_cache_expires_and_is_swept() {
        let f = fixture(Arc::new(TracingNotifier));
        f.store.upsert_node(Node::new("a", "t1", "A")).await;
        f.scheduler.run_job(JobKind::PortfolioCache).await.unwrap();
        assert!(f.scheduler.cached_portfolio().await.is_some());

        f.clock.advance(Duration::seconds(1801));
        assert!(f.scheduler.cached_portfolio().await.is_none());
        assert_eq!(f.scheduler.sweep().await, 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture(Arc::new(TracingNotifier));
        f.store.upsert_node(Node::new("a", "t1", "A")).await;
        for _ in 0..8 {
            f.scheduler.run_job(JobKind::PortfolioCache).await.unwrap();
        }
        assert_eq!(f.scheduler.health_history(&NodeId::from("a")).len(), 5);
        assert_eq!(
            f.scheduler.job_state(JobKind::PortfolioCache),
            JobState::Idle {
                last: Some(JobOutcome::Succeeded)
            }
        );
    }

    #[tokio::test]
    async fn test_running_job_is_skipped() {
        let f = fixture(Arc::new(TracingNotifier));
        let _guard = f.scheduler.try_begin(JobKind::MasterAggregation).unwrap();
        let report = f.scheduler.run_job(JobKind::MasterAggregation).await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Skipped);
        assert_eq!(f.scheduler.job_state(JobKind::MasterAggregation), JobState::Running);
    }

    #[tokio::test]
    async fn test_job_state_follows_pass_lifecycle() {
        let f = fixture(Arc::new(TracingNotifier));
        assert_eq!(
            f.scheduler.job_state(JobKind::ViolationScan),
            JobState::Idle { last: None }
        );

        {
            let _guard = f.scheduler.try_begin(JobKind::ViolationScan).unwrap();
            assert!(f.scheduler.job_state(JobKind::ViolationScan).is_running());
        }
        // Released without finishing: nothing to report yet
        assert_eq!(f.scheduler.job_state(JobKind::ViolationScan).last_outcome(), None);

        f.scheduler.run_job(JobKind::ViolationScan).await.unwrap();
        let state = f.scheduler.job_state(JobKind::ViolationScan);
        assert!(!state.is_running());
        assert_eq!(state.last_outcome(), Some(JobOutcome::Succeeded));

        // Other jobs are untouched
        assert_eq!(f.scheduler.job_state(JobKind::PortfolioCache), JobState::default());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let f = fixture(Arc::new(TracingNotifier));
        let handle = f.scheduler.start();
        tokio::task::yield_now().await;
        handle.shutdown().await;
        assert!(!f.scheduler.job_state(JobKind::ViolationScan).is_running());
    }
}
