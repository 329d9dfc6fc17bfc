//! CLI argument parsing and command dispatch.
//!
//! Every command runs against a JSONL dataset directory (`--data`, default
//! the current directory) with an optional YAML configuration (`--config`).
//!
//! # Commands
//!
//! - `critical-path`: CPM over the network containing a node
//! - `cascade`: propagate a delay downstream
//! - `impact`: transitive successors of a node
//! - `analyze`: network levels, bottlenecks, cycles and density
//! - `aggregate`: hierarchy roll-up under a node
//! - `program`: figures for a program's members
//! - `health`: score one node
//! - `portfolio`: weighted health across active nodes
//! - `violations`: scan dependencies against planned dates
//! - `recompute`: run background jobs once
//! - `link`: create dependencies, parents, program links and masters
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! trellis --data ./portfolio link dep design build --type fs --lag 2
//! trellis --data ./portfolio critical-path design
//! trellis --data ./portfolio --json cascade design --days 5
//! ```

mod args;
mod execute;
mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use args::{
    AggregateArgs, AnalyzeArgs, CascadeArgs, CriticalPathArgs, HealthArgs, ImpactArgs, LinkAction,
    LinkArgs, PortfolioArgs, ProgramArgs, RecomputeArgs, ViolationsArgs, validate_id,
};
pub use types::{DependencyTypeArg, ImpactArg, JobArg};

/// Trellis - relationship and dependency graph engine
///
/// Analyze hierarchies, programs and scheduling dependencies stored as JSONL
/// files: critical paths, delay cascades, roll-ups and health scores.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Dataset directory holding nodes.jsonl, relationships.jsonl and dependencies.jsonl
    #[arg(long, global = true, default_value = ".")]
    pub data: PathBuf,

    /// Engine configuration file (default: trellis.yaml in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compute the critical path of the network containing a node
    ///
    /// Prints early/late start and finish plus slack for every node and the
    /// zero-slack sequence.
    CriticalPath(CriticalPathArgs),

    /// Propagate a delay to every downstream node
    Cascade(CascadeArgs),

    /// List every transitive successor of a node
    ///
    /// Nodes reachable only through critical dependencies are marked.
    Impact(ImpactArgs),

    /// Analyze network structure
    ///
    /// Reports levels, bottlenecks, cycles, clustering and density over the
    /// whole dataset or the network around one node.
    Analyze(AnalyzeArgs),

    /// Roll up budget, cost and progress under a node
    Aggregate(AggregateArgs),

    /// Show figures for a program's members
    Program(ProgramArgs),

    /// Score the health of one node
    Health(HealthArgs),

    /// Score the health of every active node
    Portfolio(PortfolioArgs),

    /// Check dependencies against planned dates
    Violations(ViolationsArgs),

    /// Run background recomputation jobs once and save the results
    Recompute(RecomputeArgs),

    /// Create a structural link and save the dataset
    Link(LinkArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let Some(command) = &self.command else {
            println!("Trellis dependency graph engine");
            println!("Use --help for more information");
            return Ok(());
        };

        let app = App::open(&self.data, self.config.as_deref()).await?;
        match command {
            Commands::CriticalPath(args) => {
                execute::execute_critical_path(&app, args, output_mode).await
            }
            Commands::Cascade(args) => execute::execute_cascade(&app, args, output_mode).await,
            Commands::Impact(args) => execute::execute_impact(&app, args, output_mode).await,
            Commands::Analyze(args) => execute::execute_analyze(&app, args, output_mode).await,
            Commands::Aggregate(args) => execute::execute_aggregate(&app, args, output_mode).await,
            Commands::Program(args) => execute::execute_program(&app, args, output_mode).await,
            Commands::Health(args) => execute::execute_health(&app, args, output_mode).await,
            Commands::Portfolio(args) => execute::execute_portfolio(&app, args, output_mode).await,
            Commands::Violations(args) => {
                execute::execute_violations(&app, args, output_mode).await
            }
            Commands::Recompute(args) => execute::execute_recompute(&app, args, output_mode).await,
            Commands::Link(args) => execute::execute_link(&app, args, output_mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencyType;

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["trellis"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
        assert_eq!(cli.data, PathBuf::from("."));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trellis",
            "impact",
            "proj-1",
            "--json",
            "--data",
            "/tmp/ds",
            "--config",
            "/tmp/c.yaml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.data, PathBuf::from("/tmp/ds"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Some(Commands::Impact(_))));
    }

    #[test]
    fn test_parse_cascade_days() {
        let cli = Cli::try_parse_from(["trellis", "cascade", "x", "--days", "5"]).unwrap();
        match cli.command {
            Some(Commands::Cascade(args)) => {
                assert_eq!(args.node, "x");
                assert!((args.days - 5.0).abs() < f64::EPSILON);
            }
            _ => panic!("Expected Cascade command"),
        }
    }

    #[test]
    fn test_parse_cascade_requires_days() {
        assert!(Cli::try_parse_from(["trellis", "cascade", "x"]).is_err());
    }

    #[test]
    fn test_parse_link_dependency_defaults() {
        let cli = Cli::try_parse_from(["trellis", "link", "dep", "a", "b"]).unwrap();
        match cli.command {
            Some(Commands::Link(args)) => match args.action {
                LinkAction::Dep {
                    predecessor,
                    successor,
                    dep_type,
                    lag,
                    critical,
                    impact,
                } => {
                    assert_eq!(predecessor, "a");
                    assert_eq!(successor, "b");
                    assert_eq!(DependencyType::from(dep_type), DependencyType::FinishToStart);
                    assert_eq!(lag, 0);
                    assert!(!critical);
                    assert_eq!(impact, ImpactArg::None);
                }
                other => panic!("Expected Dep action, got {other:?}"),
            },
            _ => panic!("Expected Link command"),
        }
    }

    #[test]
    fn test_parse_link_dependency_negative_lag() {
        let cli = Cli::try_parse_from([
            "trellis", "link", "dep", "a", "b", "--type", "ss", "--lag", "-3", "--critical",
            "--impact", "high", "--actor", "pm",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Link(args)) => {
                assert_eq!(args.actor.as_deref(), Some("pm"));
                match args.action {
                    LinkAction::Dep {
                        dep_type,
                        lag,
                        critical,
                        impact,
                        ..
                    } => {
                        assert_eq!(dep_type, DependencyTypeArg::StartToStart);
                        assert_eq!(lag, -3);
                        assert!(critical);
                        assert_eq!(impact, ImpactArg::High);
                    }
                    other => panic!("Expected Dep action, got {other:?}"),
                }
            }
            _ => panic!("Expected Link command"),
        }
    }

    #[test]
    fn test_parse_recompute_job() {
        let cli =
            Cli::try_parse_from(["trellis", "recompute", "--job", "violation-scan"]).unwrap();
        match cli.command {
            Some(Commands::Recompute(args)) => {
                assert_eq!(args.job, Some(JobArg::ViolationScan));
            }
            _ => panic!("Expected Recompute command"),
        }
    }

    #[test]
    fn test_parse_rejects_blank_id() {
        assert!(Cli::try_parse_from(["trellis", "health", " "]).is_err());
    }

    #[test]
    fn test_parse_analyze_from_seed() {
        let cli =
            Cli::try_parse_from(["trellis", "analyze", "--from", "hub", "--levels"]).unwrap();
        match cli.command {
            Some(Commands::Analyze(args)) => {
                assert_eq!(args.from.as_deref(), Some("hub"));
                assert!(args.levels);
            }
            _ => panic!("Expected Analyze command"),
        }
    }
}
