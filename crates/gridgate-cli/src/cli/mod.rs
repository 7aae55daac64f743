//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;

use gridgate_srv::{telemetry, Gateway, GatewayConfig};

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(GatewayConfig::default_path);
    let mut config = GatewayConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if cli.verbose {
        config.telemetry.log_level = "debug".into();
    }
    telemetry::init(&config.telemetry);

    let gateway = Gateway::from_config(&config).context("assembling gateway")?;

    let ctx = commands::Context {
        gateway,
        user: cli.user,
        output_format: cli.output.unwrap_or_default(),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Domain(args) => commands::domain::execute(ctx, args).await,
        Commands::Route(args) => commands::route::execute(ctx, args).await,
        Commands::Tunnel(args) => commands::tunnel::execute(ctx, args).await,
        Commands::Workload(args) => commands::workload::execute(ctx, args).await,
        Commands::Identity => commands::identity::execute(&ctx),
    }
}
