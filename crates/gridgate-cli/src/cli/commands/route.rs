//! `gridgate route` - TCP router services.

use anyhow::Result;
use colored::Colorize;

use gridgate_core::Route;
use gridgate_srv::ReverseSecret;

use super::Context;
use crate::cli::args::{RouteArgs, RouteCommands};
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: RouteArgs) -> Result<()> {
    match args.command {
        RouteCommands::Forward {
            domain,
            addr,
            http_port,
            tls_port,
        } => {
            let user = ctx.require_user()?;
            ctx.gateway
                .routes
                .register_forward(user, &domain, &addr, http_port, tls_port)
                .await?;
            output::done(ctx.output_format, "routed", &domain)
        }
        RouteCommands::Reverse {
            domain,
            secret,
            encrypted,
        } => {
            let user = ctx.require_user()?;
            let secret = if encrypted {
                ReverseSecret::Encrypted(secret)
            } else {
                ReverseSecret::Plain(secret)
            };
            ctx.gateway.routes.register_reverse(user, &domain, secret).await?;
            output::done(ctx.output_format, "routed", &domain)
        }
        RouteCommands::Remove { domain } => {
            let user = ctx.require_user()?;
            ctx.gateway.routes.deregister(user, &domain).await?;
            output::done(ctx.output_format, "unrouted", &domain)
        }
        RouteCommands::Show { domain } => show(&ctx, &domain).await,
    }
}

async fn show(ctx: &Context, domain: &str) -> Result<()> {
    let entry = ctx.gateway.routes.entry(domain).await?;

    if ctx.output_format == OutputFormat::Json {
        return output::print_json(&entry);
    }

    println!("{} {}", "Domain:".bold(), domain.cyan());
    let Some(entry) = entry else {
        output::field("route", "(none)".dimmed());
        return Ok(());
    };
    output::field("owner", entry.owner.yellow());
    match &entry.route {
        Route::Forward {
            addr,
            http_port,
            tls_port,
        } => {
            output::field("kind", "forward");
            output::field("backend", addr);
            output::field("http", http_port);
            output::field("tls", tls_port);
        }
        Route::Reverse { client_secret } => {
            output::field("kind", "reverse");
            // only the owner half of the secret is shown
            let owner_part = client_secret.split(':').next().unwrap_or_default();
            output::field("secret", format!("{owner_part}:****"));
        }
    }
    Ok(())
}
