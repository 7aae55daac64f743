//! Command implementations.

pub mod domain;
pub mod identity;
pub mod route;
pub mod tunnel;
pub mod workload;

use gridgate_srv::{Gateway, TunnelAuthority};

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Clone)]
pub struct Context {
    /// Assembled node
    pub gateway: Gateway,

    /// Acting identity
    pub user: Option<String>,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,
}

impl Context {
    /// Get the acting user, returning an error if not set.
    pub fn require_user(&self) -> anyhow::Result<&str> {
        self.user.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            anyhow::anyhow!(
                "This command acts on behalf of a user.\n\n\
                 Set it with one of:\n  \
                 1. --user <ID>\n  \
                 2. GRIDGATE_USER environment variable"
            )
        })
    }

    /// The tunnel authority, if tunneling is enabled.
    pub fn tunnel(&self) -> anyhow::Result<&TunnelAuthority> {
        self.gateway.tunnel.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Tunneling is disabled on this node (set tunnel.enabled = true)")
        })
    }
}
