//! Routes parsed commands to their handlers.

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::info;

use fundflow::config::FlowConfig;
use fundflow::engine::run_with_config;
use fundflow::error::Result;
use fundflow::reports::FlowReport;

use crate::cli::{formatters, Cli, Commands};

/// Merge command-line overrides into the loaded config
pub fn resolve_config(cli: &Cli) -> Result<FlowConfig> {
    let mut config = FlowConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.resources {
        config.resources_dir = dir.clone();
    }
    if let Some(file) = &cli.transactions {
        config.transactions_file = file.clone();
    }
    if let Some(policy) = cli.unknown_currency {
        config.unknown_currency = policy;
    }
    Ok(config)
}

pub fn dispatch_command(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    info!(
        "Replaying {} against prices in {}",
        config.transactions_file.display(),
        config.resources_dir.display()
    );
    let report = run_with_config(&config)?;

    match &cli.command {
        Commands::Flows { symbol } => dispatch_flows(&report, symbol.as_deref(), cli.json),
        Commands::Summary => dispatch_summary(&report, cli.json),
        Commands::Positions => dispatch_positions(&report, cli.json),
        Commands::Export { output } => dispatch_export(&report, output.as_deref()),
    }
}

fn dispatch_flows(report: &FlowReport, symbol: Option<&str>, json_output: bool) -> Result<()> {
    if json_output {
        let edges: Vec<_> = report
            .edges
            .iter()
            .filter(|edge| symbol.map_or(true, |s| edge.symbol.eq_ignore_ascii_case(s)))
            .collect();
        println!("{}", formatters::to_json(&edges));
    } else {
        print!("{}", formatters::format_flows_table(report, symbol));
    }
    Ok(())
}

fn dispatch_summary(report: &FlowReport, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", formatters::to_json(report));
    } else {
        print!("{}", formatters::format_summary_table(report));
    }
    Ok(())
}

fn dispatch_positions(report: &FlowReport, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", formatters::to_json(&report.positions));
    } else {
        print!("{}", formatters::format_positions_table(report));
    }
    Ok(())
}

fn dispatch_export(report: &FlowReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.sankey())?;
    match output {
        Some(path) => {
            fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} nodes and {} links to {}",
                report.nodes.len(),
                report.edges.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
