//! `gridgate tunnel` - 4to6 WireGuard peers.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{TunnelArgs, TunnelCommands};
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: TunnelArgs) -> Result<()> {
    let tunnel = ctx.tunnel()?;
    match args.command {
        TunnelCommands::Setup => {
            tunnel.setup().await?;
            output::done(ctx.output_format, "set up", &tunnel.pool().gateway().to_string())
        }
        TunnelCommands::Teardown => {
            tunnel.teardown().await?;
            output::done(ctx.output_format, "tore down", "tunnel")
        }
        TunnelCommands::AddPeer { public_key } => {
            let user = ctx.require_user()?;
            let config = tunnel.add_peer(user, &public_key).await?;
            match ctx.output_format {
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Pretty => {
                    println!("{}", "[Interface]".bold());
                    println!("Address = {}", config.ips.join(", ").cyan());
                    for peer in &config.peers {
                        println!();
                        println!("{}", "[Peer]".bold());
                        println!("PublicKey = {}", peer.public_key);
                        println!("Endpoint = {}", peer.endpoint);
                        println!("AllowedIPs = {}", peer.allowed_ips.join(", "));
                    }
                    Ok(())
                }
            }
        }
        TunnelCommands::RemovePeer { public_key } => {
            tunnel.remove_peer(&public_key).await?;
            output::done(ctx.output_format, "removed peer", &public_key)
        }
        TunnelCommands::Address { user } => {
            let user = match user {
                Some(user) => user,
                None => ctx.require_user()?.to_string(),
            };
            let address = tunnel.address(&user);
            match ctx.output_format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "user": user,
                    "address": address,
                    "subnet": tunnel.pool().subnet().to_string(),
                })),
                OutputFormat::Pretty => {
                    output::field("user", user.yellow());
                    output::field("address", address.to_string().cyan());
                    output::field("subnet", tunnel.pool().subnet());
                    Ok(())
                }
            }
        }
    }
}
