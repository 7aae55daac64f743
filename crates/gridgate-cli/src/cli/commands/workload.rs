//! `gridgate workload` - replay workload files through the provisioner.

use anyhow::{Context as _, Result};
use colored::Colorize;
use serde::Deserialize;
use std::path::Path;

use gridgate_core::Workload;
use gridgate_srv::ProvisionOutcome;

use super::Context;
use crate::cli::args::{WorkloadArgs, WorkloadCommands};
use crate::output::{self, OutputFormat};

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkloadFile {
    Many(Vec<Workload>),
    One(Box<Workload>),
}

/// Read one workload or an array of them
pub fn read_workloads(path: &Path) -> Result<Vec<Workload>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: WorkloadFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing workloads in {}", path.display()))?;
    Ok(match file {
        WorkloadFile::Many(workloads) => workloads,
        WorkloadFile::One(workload) => vec![*workload],
    })
}

pub async fn execute(ctx: Context, args: WorkloadArgs) -> Result<()> {
    match args.command {
        WorkloadCommands::Provision { file } => provision(&ctx, &file).await,
        WorkloadCommands::Decommission { file } => decommission(&ctx, &file).await,
    }
}

async fn provision(ctx: &Context, file: &Path) -> Result<()> {
    let workloads = read_workloads(file)?;
    let results = ctx.gateway.provisioner.provision_all(workloads).await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    match ctx.output_format {
        OutputFormat::Json => {
            let report: Vec<_> = results
                .iter()
                .map(|(wl, result)| match result {
                    Ok(outcome) => serde_json::json!({"id": wl.id, "ok": true, "result": outcome}),
                    Err(e) => serde_json::json!({"id": wl.id, "ok": false, "error": e.to_string()}),
                })
                .collect();
            output::print_json(&report)?;
        }
        OutputFormat::Pretty => {
            for (wl, result) in &results {
                match result {
                    Ok(outcome) => {
                        println!("{} {} ({})", "✓".green().bold(), wl.id, wl.workload_type);
                        if let ProvisionOutcome::Tunnel(config) = outcome {
                            output::field("address", config.ips.join(", ").cyan());
                        }
                    }
                    Err(e) => println!("{} {} ({}): {}", "✗".red().bold(), wl.id, wl.workload_type, e),
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workloads failed", results.len());
    }
    Ok(())
}

async fn decommission(ctx: &Context, file: &Path) -> Result<()> {
    let mut workloads = read_workloads(file)?;
    // reverse startup order so subdomains go before their zones
    gridgate_srv::provision::sort_for_startup(&mut workloads);
    workloads.reverse();

    let mut failed = 0usize;
    for wl in &workloads {
        let result = ctx.gateway.provisioner.decommission(wl).await;
        if ctx.output_format == OutputFormat::Pretty {
            match &result {
                Ok(()) => println!("{} {} ({})", "✓".green().bold(), wl.id, wl.workload_type),
                Err(e) => println!("{} {} ({}): {}", "✗".red().bold(), wl.id, wl.workload_type, e),
            }
        } else if let Err(e) = &result {
            output::print_json(&serde_json::json!({"id": wl.id, "ok": false, "error": e.to_string()}))?;
        }
        if result.is_err() {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workloads failed", workloads.len());
    }
    if ctx.output_format == OutputFormat::Json {
        output::print_json(&serde_json::json!({"ok": true, "count": workloads.len()}))?;
    }
    Ok(())
}
