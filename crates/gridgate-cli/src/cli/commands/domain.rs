//! `gridgate domain` - zone delegation and subdomain records.

use anyhow::Result;
use colored::Colorize;
use std::net::IpAddr;

use super::Context;
use crate::cli::args::{DomainArgs, DomainCommands};
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: DomainArgs) -> Result<()> {
    match args.command {
        DomainCommands::Delegate { zone } => {
            let user = ctx.require_user()?;
            ctx.gateway.domains.delegate(user, &zone).await?;
            output::done(ctx.output_format, "delegated", &zone)
        }
        DomainCommands::Revoke { zone } => {
            let user = ctx.require_user()?;
            ctx.gateway.domains.revoke(user, &zone).await?;
            output::done(ctx.output_format, "revoked", &zone)
        }
        DomainCommands::Claim { domain, ips } => claim(&ctx, &domain, &ips).await,
        DomainCommands::Release { domain, ips } => {
            let user = ctx.require_user()?;
            ctx.gateway.domains.release(user, &domain, &ips).await?;
            output::done(ctx.output_format, "released", &domain)
        }
        DomainCommands::Show { name } => show(&ctx, &name).await,
    }
}

async fn claim(ctx: &Context, domain: &str, ips: &[IpAddr]) -> Result<()> {
    let user = ctx.require_user()?;
    ctx.gateway.domains.claim(user, domain, ips).await?;
    if ctx.output_format == OutputFormat::Pretty && ctx.verbose {
        for ip in ips {
            println!("  {} {}", "+".green(), ip);
        }
    }
    output::done(ctx.output_format, "claimed", domain)
}

async fn show(ctx: &Context, name: &str) -> Result<()> {
    let domains = &ctx.gateway.domains;
    let owner = domains.zone_owner(name).await?;
    let labels = if owner.is_some() {
        domains.labels(name).await?
    } else {
        Vec::new()
    };
    let records = domains.records(name).await?;

    match ctx.output_format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "name": name,
            "zone_owner": owner,
            "labels": labels,
            "records": records,
        })),
        OutputFormat::Pretty => {
            println!("{} {}", "Name:".bold(), name.cyan());
            match &owner {
                Some(owner) => output::field("zone owner", owner.yellow()),
                None => output::field("zone owner", "(not delegated)".dimmed()),
            }
            if !labels.is_empty() {
                println!();
                println!("{}", "Labels:".bold().underline());
                for label in &labels {
                    println!("  {}.{}", label.green(), name);
                }
            }
            if !records.is_empty() {
                println!();
                println!("{}", "Records:".bold().underline());
                for record in records.iter() {
                    println!("  {record}");
                }
            }
            Ok(())
        }
    }
}
