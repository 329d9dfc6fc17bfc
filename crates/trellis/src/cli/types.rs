//! CLI value enums and domain type conversions.

use clap::ValueEnum;

use crate::domain::{DependencyType, Impact};
use crate::scheduler::JobKind;

/// Dependency type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyTypeArg {
    /// Finish-to-start
    #[value(name = "fs", alias = "finish-to-start")]
    FinishToStart,
    /// Start-to-start
    #[value(name = "ss", alias = "start-to-start")]
    StartToStart,
    /// Finish-to-finish
    #[value(name = "ff", alias = "finish-to-finish")]
    FinishToFinish,
    /// Start-to-finish
    #[value(name = "sf", alias = "start-to-finish")]
    StartToFinish,
}

impl From<DependencyTypeArg> for DependencyType {
    fn from(arg: DependencyTypeArg) -> Self {
        match arg {
            DependencyTypeArg::FinishToStart => Self::FinishToStart,
            DependencyTypeArg::StartToStart => Self::StartToStart,
            DependencyTypeArg::FinishToFinish => Self::FinishToFinish,
            DependencyTypeArg::StartToFinish => Self::StartToFinish,
        }
    }
}

/// Impact level for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImpactArg {
    /// No recorded impact
    #[default]
    None,
    /// Minor
    Low,
    /// Noticeable
    Medium,
    /// Serious
    High,
    /// Program-threatening
    Critical,
}

impl From<ImpactArg> for Impact {
    fn from(arg: ImpactArg) -> Self {
        match arg {
            ImpactArg::None => Self::None,
            ImpactArg::Low => Self::Low,
            ImpactArg::Medium => Self::Medium,
            ImpactArg::High => Self::High,
            ImpactArg::Critical => Self::Critical,
        }
    }
}

/// Background job for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobArg {
    /// Refresh master aggregates
    #[value(name = "master-aggregation")]
    MasterAggregation,
    /// Refresh program metrics
    #[value(name = "program-metrics")]
    ProgramMetrics,
    /// Scan dependencies for violations
    #[value(name = "violation-scan")]
    ViolationScan,
    /// Re-score nodes and the portfolio
    #[value(name = "portfolio-cache")]
    PortfolioCache,
}

impl From<JobArg> for JobKind {
    fn from(arg: JobArg) -> Self {
        match arg {
            JobArg::MasterAggregation => Self::MasterAggregation,
            JobArg::ProgramMetrics => Self::ProgramMetrics,
            JobArg::ViolationScan => Self::ViolationScan,
            JobArg::PortfolioCache => Self::PortfolioCache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("fs", DependencyType::FinishToStart)]
    #[case("start-to-start", DependencyType::StartToStart)]
    #[case("ff", DependencyType::FinishToFinish)]
    #[case("sf", DependencyType::StartToFinish)]
    fn test_dependency_type_names(#[case] input: &str, #[case] expected: DependencyType) {
        let arg = DependencyTypeArg::from_str(input, true).unwrap();
        assert_eq!(DependencyType::from(arg), expected);
    }

    #[test]
    fn test_job_arg_round_trips_names() {
        for job in JobKind::ALL {
            let arg = JobArg::from_str(job.name(), false).unwrap();
            assert_eq!(JobKind::from(arg), job);
        }
    }
}
