//! `gridgate identity` - show this node's identity.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::output::{self, OutputFormat};

pub fn execute(ctx: &Context) -> Result<()> {
    let identity = &ctx.gateway.identity;
    let tunnel = ctx.gateway.tunnel.as_ref();
    let supported: Vec<String> = ctx
        .gateway
        .provisioner
        .supported()
        .iter()
        .map(ToString::to_string)
        .collect();

    match ctx.output_format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "name": identity.name(),
            "public_key": identity.public_key_hex(),
            "wireguard_public_key": identity.wireguard_public_key().to_string(),
            "tunnel_subnet": tunnel.map(|t| t.pool().subnet().to_string()),
            "supported": supported,
        })),
        OutputFormat::Pretty => {
            println!("{}", "Gateway identity".bold().underline());
            output::field("name", identity.name().cyan());
            output::field("ed25519", identity.public_key_hex());
            output::field("wireguard", identity.wireguard_public_key());
            match tunnel {
                Some(t) => output::field("subnet", t.pool().subnet()),
                None => output::field("subnet", "(tunnel disabled)".dimmed()),
            }
            output::field("workloads", supported.join(", "));
            Ok(())
        }
    }
}
