//! Command execution logic.
//!
//! Each `execute_*` function runs one command against an opened [`App`] and
//! prints in the requested [`OutputMode`].

use anyhow::Result;

use super::args::{
    AggregateArgs, AnalyzeArgs, CascadeArgs, CriticalPathArgs, HealthArgs, ImpactArgs, LinkAction,
    LinkArgs, PortfolioArgs, ProgramArgs, RecomputeArgs, ViolationsArgs,
};
use crate::analysis::DerivedMetrics;
use crate::app::App;
use crate::domain::{NewDependency, NodeFilter, NodeId, TenantId};
use crate::output::{self, OutputMode};
use crate::scheduler::{JobKind, JobReport};

fn print_derived(derived: &DerivedMetrics) {
    println!(
        "  {} {:.2}   {} {:.2}   {} {:.2}",
        output::label("Variance:"),
        derived.budget_variance,
        output::label("CPI:"),
        derived.cost_performance_index,
        output::label("SPI:"),
        derived.schedule_performance_index
    );
    println!(
        "  {} {:.1}   {} {:.1}",
        output::label("Budget health:"),
        derived.budget_health_score,
        output::label("Health:"),
        derived.health_score
    );
}

fn report_json(report: &JobReport) -> serde_json::Value {
    serde_json::json!({
        "job": report.job.name(),
        "outcome": format!("{:?}", report.outcome),
        "succeeded": report.succeeded,
        "failed": report.failed,
        "failures": report
            .failures
            .iter()
            .map(|f| serde_json::json!({
                "node": f.node,
                "kind": f.kind.code(),
                "message": f.message,
            }))
            .collect::<Vec<_>>(),
        "swept": report.swept,
        "started_at": report.started_at,
        "finished_at": report.finished_at,
    })
}

/// Execute the critical-path command
pub async fn execute_critical_path(
    app: &App,
    args: &CriticalPathArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let path = app
        .engine()
        .dependencies()
        .critical_path(&NodeId::from(args.node.as_str()))
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&path)?,
        OutputMode::Text => {
            println!(
                "{} ({} nodes, duration {})",
                output::header("Critical path"),
                path.entries.len(),
                output::days(path.project_duration)
            );
            if path.had_cycle {
                println!("  warning: network contains a cycle; order was forced");
            }
            println!("    {:<20} {:>8} {:>8} {:>8} {:>8} {:>8}", "node", "ES", "EF", "LS", "LF", "slack");
            for entry in &path.entries {
                println!(
                    "  {} {:<20} {:>8.1} {:>8.1} {:>8.1} {:>8.1} {:>8.1}",
                    output::critical_marker(entry.is_critical),
                    entry.node_id.as_str(),
                    entry.early_start,
                    entry.early_finish,
                    entry.late_start,
                    entry.late_finish,
                    entry.slack
                );
            }
            let sequence: Vec<&str> = path.critical_path.iter().map(NodeId::as_str).collect();
            println!("  {} {}", output::label("Sequence:"), sequence.join(" -> "));
        }
    }
    Ok(())
}

/// Execute the cascade command
pub async fn execute_cascade(app: &App, args: &CascadeArgs, output_mode: OutputMode) -> Result<()> {
    let result = app
        .engine()
        .dependencies()
        .cascading_delay(&NodeId::from(args.node.as_str()), args.days)
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&result)?,
        OutputMode::Text => {
            if result.delays.is_empty() {
                println!("No downstream node is delayed by {}", output::id(&args.node));
            } else {
                println!(
                    "{} from {} ({}):",
                    output::header("Delay cascade"),
                    output::id(&args.node),
                    output::days(result.initial_delay)
                );
                for delay in &result.delays {
                    println!(
                        "  {:>3}  {:<20} +{}",
                        delay.depth,
                        delay.node_id.as_str(),
                        output::days(delay.delay_days)
                    );
                }
            }
            if result.truncated {
                println!("  (stopped at the traversal depth bound)");
            }
        }
    }
    Ok(())
}

/// Execute the impact command
pub async fn execute_impact(app: &App, args: &ImpactArgs, output_mode: OutputMode) -> Result<()> {
    let analysis = app
        .engine()
        .dependencies()
        .impact_analysis(&NodeId::from(args.node.as_str()))
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&analysis)?,
        OutputMode::Text => {
            println!(
                "{} of {} ({} nodes):",
                output::header("Impact"),
                output::id(&args.node),
                analysis.impacted.len()
            );
            for node in &analysis.impacted {
                println!(
                    "  {} {:>3}  {}",
                    output::critical_marker(node.via_critical),
                    node.distance,
                    node.node_id
                );
            }
            if analysis.truncated {
                println!("  (stopped at the traversal depth bound)");
            }
        }
    }
    Ok(())
}

/// Execute the analyze command
pub async fn execute_analyze(app: &App, args: &AnalyzeArgs, output_mode: OutputMode) -> Result<()> {
    let network = app.engine().network();
    let snapshot = match &args.from {
        Some(seed) => network.snapshot_from(&NodeId::from(seed.as_str())).await?,
        None => network.snapshot_all().await?,
    };
    let summary = snapshot.summary();
    let levels = args.levels.then(|| snapshot.levels());

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "summary": summary,
            "levels": levels,
        }))?,
        OutputMode::Text => {
            println!("{}", output::header("Network"));
            println!(
                "  {} {}   {} {}   {} {}",
                output::label("Nodes:"),
                summary.node_count,
                output::label("Edges:"),
                summary.edge_count,
                output::label("Levels:"),
                summary.max_level.map_or(0, |level| level + 1)
            );
            println!(
                "  {} {:.3}   {} {:.3}",
                output::label("Density:"),
                summary.density,
                output::label("Clustering:"),
                summary.clustering_coefficient
            );
            for bottleneck in &summary.bottlenecks {
                println!(
                    "  bottleneck {} (out {}, in {})",
                    output::id(bottleneck.node_id.as_str()),
                    bottleneck.out_degree,
                    bottleneck.in_degree
                );
            }
            for cycle in &summary.cycles {
                let members: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
                println!("  cycle: {}", members.join(", "));
            }
            if let Some(levels) = levels {
                for (node, level) in levels {
                    println!("  {level:>3}  {node}");
                }
            }
        }
    }
    Ok(())
}

/// Execute the aggregate command
pub async fn execute_aggregate(
    app: &App,
    args: &AggregateArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let rollup = app
        .engine()
        .aggregation()
        .aggregate(&NodeId::from(args.node.as_str()))
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&rollup)?,
        OutputMode::Text => {
            println!(
                "{} {} ({} sub-nodes, {} active)",
                output::header("Roll-up of"),
                output::id(&args.node),
                rollup.total_sub_nodes,
                rollup.active_sub_nodes
            );
            println!(
                "  {} {:.2}   {} {:.2}   {} {:.1}%",
                output::label("Budget:"),
                rollup.budget,
                output::label("Cost:"),
                rollup.cost,
                output::label("Progress:"),
                rollup.progress
            );
            print_derived(&rollup.derived);
        }
    }
    Ok(())
}

/// Execute the program command
pub async fn execute_program(app: &App, args: &ProgramArgs, output_mode: OutputMode) -> Result<()> {
    let metrics = app
        .engine()
        .aggregation()
        .program_metrics(&NodeId::from(args.program.as_str()))
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&metrics)?,
        OutputMode::Text => {
            println!(
                "{} {} ({} members: {} active, {} completed, {} at risk)",
                output::header("Program"),
                output::id(&args.program),
                metrics.member_count,
                metrics.active_members,
                metrics.completed_members,
                metrics.at_risk_members
            );
            println!(
                "  {} {:.2}   {} {:.2}   {} {:.1}%",
                output::label("Budget:"),
                metrics.budget,
                output::label("Cost:"),
                metrics.cost,
                output::label("Progress:"),
                metrics.progress
            );
            print_derived(&metrics.derived);
        }
    }
    Ok(())
}

/// Execute the health command
pub async fn execute_health(app: &App, args: &HealthArgs, output_mode: OutputMode) -> Result<()> {
    let record = app
        .engine()
        .health()
        .node_health(&NodeId::from(args.node.as_str()), &[])
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&record)?,
        OutputMode::Text => {
            println!(
                "{} {}: {} ({}, {})",
                output::header("Health of"),
                output::id(&args.node),
                record.score,
                output::band(record.band),
                record.trend
            );
            let s = &record.sub_scores;
            println!(
                "  schedule {:.0}  budget {:.0}  progress {:.0}  quality {:.0}  team {:.0}",
                s.schedule, s.budget, s.progress, s.quality, s.team
            );
        }
    }
    Ok(())
}

/// Execute the portfolio command
pub async fn execute_portfolio(
    app: &App,
    args: &PortfolioArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let filter = NodeFilter {
        tenant: args.tenant.as_deref().map(TenantId::from),
        active_only: true,
        ..NodeFilter::default()
    };
    let portfolio = app.engine().health().portfolio_health(&filter).await?;

    match output_mode {
        OutputMode::Json => output::print_json(&portfolio)?,
        OutputMode::Text => {
            println!(
                "{} {:.1} over {} nodes",
                output::header("Portfolio health"),
                portfolio.score,
                portfolio.node_count
            );
            let d = &portfolio.distribution;
            println!(
                "  healthy {}  warning {}  critical {}",
                d.healthy, d.warning, d.critical
            );
            for node in &portfolio.critical_nodes {
                println!("  {} {}", output::band(crate::analysis::HealthBand::Critical), node);
            }
        }
    }
    Ok(())
}

/// Execute the violations command
pub async fn execute_violations(
    app: &App,
    args: &ViolationsArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let scheduler = app.engine().scheduler();
    scheduler.run_job(JobKind::ViolationScan).await?;
    let violations = scheduler.cached_violations().await;
    if args.save {
        app.save().await?;
    }

    match output_mode {
        OutputMode::Json => output::print_json(&violations)?,
        OutputMode::Text => {
            if violations.is_empty() {
                println!("No dependency violations");
            }
            for violation in &violations {
                println!(
                    "  {:<8} {} -> {} [{}] late by {}",
                    output::severity(violation.severity),
                    violation.predecessor,
                    violation.successor,
                    violation.dependency_type,
                    output::days(violation.violation_days)
                );
            }
        }
    }
    Ok(())
}

/// Execute the recompute command
pub async fn execute_recompute(
    app: &App,
    args: &RecomputeArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let scheduler = app.engine().scheduler();
    let reports = match args.job {
        Some(job) => vec![scheduler.run_job(job.into()).await?],
        None => scheduler.run_all().await?,
    };
    app.save().await?;

    match output_mode {
        OutputMode::Json => {
            let reports: Vec<_> = reports.iter().map(report_json).collect();
            output::print_json(&reports)?;
        }
        OutputMode::Text => {
            for report in &reports {
                println!(
                    "{:<20} {:?}: {} ok, {} failed",
                    report.job.name(),
                    report.outcome,
                    report.succeeded,
                    report.failed
                );
                for failure in &report.failures {
                    println!("  {failure}");
                }
            }
        }
    }
    Ok(())
}

/// Execute the link command
pub async fn execute_link(app: &App, args: &LinkArgs, output_mode: OutputMode) -> Result<()> {
    let actor = args.actor.as_deref();
    let engine = app.engine();

    let (action, id, detail) = match &args.action {
        LinkAction::Dep {
            predecessor,
            successor,
            dep_type,
            lag,
            critical,
            impact,
        } => {
            let mut dependency =
                NewDependency::new(predecessor.as_str(), successor.as_str(), (*dep_type).into())
                    .with_lag(*lag)
                    .with_impact((*impact).into());
            dependency.is_critical = *critical;
            let edge = engine.dependencies().create_dependency(dependency, actor).await?;
            let detail = format!(
                "{} --[{} {:+}d]--> {}",
                edge.predecessor, edge.dependency_type, edge.lag_days, edge.successor
            );
            ("dependency", edge.id.to_string(), detail)
        }
        LinkAction::Parent { child, parent } => {
            let edge = engine
                .relationships()
                .move_node(&NodeId::from(child.as_str()), &NodeId::from(parent.as_str()), actor)
                .await?;
            ("parent", edge.id.to_string(), format!("{parent} > {child}"))
        }
        LinkAction::Program { node, program } => {
            let edge = engine
                .relationships()
                .assign_program(&NodeId::from(node.as_str()), &NodeId::from(program.as_str()), actor)
                .await?;
            ("program", edge.id.to_string(), format!("{node} in {program}"))
        }
        LinkAction::Master { node } => {
            let aggregate = engine
                .relationships()
                .promote_to_master(&NodeId::from(node.as_str()), actor)
                .await?;
            (
                "master",
                node.clone(),
                format!(
                    "{node} (budget {:.2}, progress {:.1}%)",
                    aggregate.aggregated_budget, aggregate.aggregated_progress
                ),
            )
        }
    };
    app.save().await?;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "action": action,
            "id": id,
            "detail": detail,
            "status": "success"
        }))?,
        OutputMode::Text => println!("Linked {action} {}: {detail}", output::id(&id)),
    }
    Ok(())
}
