//! Job identities and pass reports.

use crate::error::UnitFailure;
use chrono::{DateTime, Utc};
use std::fmt;

/// A recurring recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    /// Refresh every master aggregate
    MasterAggregation,
    /// Refresh figures for every program
    ProgramMetrics,
    /// Re-check temporal consistency of every active dependency
    ViolationScan,
    /// Re-score active nodes and the portfolio
    PortfolioCache,
}

impl JobKind {
    /// Every job, in schedule order
    pub const ALL: [Self; 4] = [
        Self::MasterAggregation,
        Self::ProgramMetrics,
        Self::ViolationScan,
        Self::PortfolioCache,
    ];

    /// Name used in logs and failure records
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MasterAggregation => "master-aggregation",
            Self::ProgramMetrics => "program-metrics",
            Self::ViolationScan => "violation-scan",
            Self::PortfolioCache => "portfolio-cache",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every unit succeeded
    Succeeded,
    /// Some units failed; the rest were committed
    PartialFailure,
    /// Another pass of the same job was still running
    Skipped,
}

/// Lifecycle state of a job between ticks.
///
/// A finished pass returns the job to `Idle` carrying its outcome, so the
/// state reads `Running -> Succeeded | PartialFailure -> Idle` across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for the next tick
    Idle {
        /// Outcome of the most recent completed pass, if any
        last: Option<JobOutcome>,
    },
    /// A pass is in progress
    Running,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Idle { last: None }
    }
}

impl JobState {
    /// Whether a pass is in progress
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Outcome of the most recent completed pass
    #[must_use]
    pub const fn last_outcome(self) -> Option<JobOutcome> {
        match self {
            Self::Idle { last } => last,
            Self::Running => None,
        }
    }
}

/// Summary of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// Which job ran
    pub job: JobKind,
    /// How it ended
    pub outcome: JobOutcome,
    /// Units committed
    pub succeeded: usize,
    /// Units that failed
    pub failed: usize,
    /// Details of each failure
    pub failures: Vec<UnitFailure>,
    /// Expired cache entries removed after the pass
    pub swept: usize,
    /// Pass start
    pub started_at: DateTime<Utc>,
    /// Pass end
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub(crate) fn skipped(job: JobKind, now: DateTime<Utc>) -> Self {
        Self {
            job,
            outcome: JobOutcome::Skipped,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            swept: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn from_units(
        job: JobKind,
        units: Vec<Result<(), UnitFailure>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let total = units.len();
        let failures: Vec<UnitFailure> = units.into_iter().filter_map(Result::err).collect();
        let failed = failures.len();
        Self {
            job,
            outcome: if failed == 0 {
                JobOutcome::Succeeded
            } else {
                JobOutcome::PartialFailure
            },
            succeeded: total - failed,
            failed,
            failures,
            swept: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use crate::error::Error;

    #[test]
    fn test_report_counts_failures() {
        let failure = UnitFailure::new(
            JobKind::ProgramMetrics.name(),
            NodeId::from("p1"),
            &Error::NodeNotFound(NodeId::from("p1")),
        );
        let report = JobReport::from_units(
            JobKind::ProgramMetrics,
            vec![Ok(()), Err(failure), Ok(())],
            Utc::now(),
        );
        assert_eq!(report.outcome, JobOutcome::PartialFailure);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_empty_pass_succeeds() {
        let report = JobReport::from_units(JobKind::ViolationScan, Vec::new(), Utc::now());
        assert_eq!(report.outcome, JobOutcome::Succeeded);
        assert_eq!(report.succeeded, 0);
    }
}
