//! CLI argument structs for all commands.
//!
//! Each command has its own argument struct with clap derive attributes
//! for parsing and validation.

use clap::{Parser, Subcommand};

use super::types::{DependencyTypeArg, ImpactArg, JobArg};

/// Validate a node or edge id: non-empty with no whitespace.
pub fn validate_id(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Id cannot be empty".to_string());
    }
    if s.chars().any(char::is_whitespace) {
        return Err(format!("Invalid id '{s}': ids cannot contain whitespace"));
    }
    Ok(s.to_string())
}

/// Arguments for the `critical-path` command
#[derive(Parser, Debug, Clone)]
pub struct CriticalPathArgs {
    /// Any node in the network
    #[arg(value_parser = validate_id)]
    pub node: String,
}

/// Arguments for the `cascade` command
#[derive(Parser, Debug, Clone)]
pub struct CascadeArgs {
    /// Node whose delay is propagated
    #[arg(value_parser = validate_id)]
    pub node: String,

    /// Delay in days applied to the node
    #[arg(short, long)]
    pub days: f64,
}

/// Arguments for the `impact` command
#[derive(Parser, Debug, Clone)]
pub struct ImpactArgs {
    /// Node whose successors are listed
    #[arg(value_parser = validate_id)]
    pub node: String,
}

/// Arguments for the `analyze` command
#[derive(Parser, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Restrict to the network reachable from this node
    #[arg(long, value_parser = validate_id)]
    pub from: Option<String>,

    /// Print the level of every node
    #[arg(short, long)]
    pub levels: bool,
}

/// Arguments for the `aggregate` command
#[derive(Parser, Debug, Clone)]
pub struct AggregateArgs {
    /// Root of the hierarchy to roll up
    #[arg(value_parser = validate_id)]
    pub node: String,
}

/// Arguments for the `program` command
#[derive(Parser, Debug, Clone)]
pub struct ProgramArgs {
    /// Program node
    #[arg(value_parser = validate_id)]
    pub program: String,
}

/// Arguments for the `health` command
#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    /// Node to score
    #[arg(value_parser = validate_id)]
    pub node: String,
}

/// Arguments for the `portfolio` command
#[derive(Parser, Debug, Clone, Default)]
pub struct PortfolioArgs {
    /// Restrict to one tenant
    #[arg(short, long)]
    pub tenant: Option<String>,
}

/// Arguments for the `violations` command
#[derive(Parser, Debug, Clone, Default)]
pub struct ViolationsArgs {
    /// Write the recorded violations back to the dataset
    #[arg(long)]
    pub save: bool,
}

/// Arguments for the `recompute` command
#[derive(Parser, Debug, Clone, Default)]
pub struct RecomputeArgs {
    /// Run only this job (default: all, in schedule order)
    #[arg(short, long, value_enum)]
    pub job: Option<JobArg>,
}

/// Arguments for the `link` command
#[derive(Parser, Debug, Clone)]
pub struct LinkArgs {
    /// Link subcommand
    #[command(subcommand)]
    pub action: LinkAction,

    /// Actor recorded on the new edge
    #[arg(long, global = true)]
    pub actor: Option<String>,
}

/// Structural writes
#[derive(Subcommand, Debug, Clone)]
pub enum LinkAction {
    /// Add a dependency
    Dep {
        /// Node that must progress first
        #[arg(value_parser = validate_id)]
        predecessor: String,

        /// Node constrained by the predecessor
        #[arg(value_parser = validate_id)]
        successor: String,

        /// Dependency type
        #[arg(short = 't', long = "type", value_enum, default_value = "fs")]
        dep_type: DependencyTypeArg,

        /// Lag in days (negative for lead time)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        lag: i32,

        /// Mark the dependency as critical
        #[arg(long)]
        critical: bool,

        /// Business impact
        #[arg(long, value_enum, default_value = "none")]
        impact: ImpactArg,
    },

    /// Attach a node under a parent, moving it if it already has one
    Parent {
        /// Child node
        #[arg(value_parser = validate_id)]
        child: String,

        /// New parent
        #[arg(value_parser = validate_id)]
        parent: String,
    },

    /// Assign a node to a program
    Program {
        /// Member node
        #[arg(value_parser = validate_id)]
        node: String,

        /// Program node
        #[arg(value_parser = validate_id)]
        program: String,
    },

    /// Promote a node to master
    Master {
        /// Node to promote
        #[arg(value_parser = validate_id)]
        node: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("proj-1", Ok("proj-1".to_string()))]
    #[case("  proj-1  ", Ok("proj-1".to_string()))]
    #[case("", Err(()))]
    #[case("two words", Err(()))]
    fn test_validate_id(#[case] input: &str, #[case] expected: Result<String, ()>) {
        assert_eq!(validate_id(input).map_err(|_| ()), expected);
    }
}
