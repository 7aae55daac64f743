//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Operator interface for a grid gateway node
///
/// Delegate zones, publish subdomains, register TCP routes and manage 4to6
/// tunnel peers against the node's configuration store.
#[derive(Parser, Debug)]
#[command(name = "gridgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Node configuration file
    #[arg(short, long, env = "GRIDGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Identity to act as
    #[arg(short, long, env = "GRIDGATE_USER", global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Zone delegation and subdomain records
    Domain(DomainArgs),

    /// TCP router services
    Route(RouteArgs),

    /// 4to6 WireGuard tunnel
    Tunnel(TunnelArgs),

    /// Replay workload files through the provisioner
    Workload(WorkloadArgs),

    /// Show this node's identity
    Identity,
}

// ============================================================================
// Domain command
// ============================================================================

#[derive(Args, Debug)]
pub struct DomainArgs {
    #[command(subcommand)]
    pub command: DomainCommands,
}

#[derive(Subcommand, Debug)]
pub enum DomainCommands {
    /// Delegate a zone to the acting user
    Delegate {
        /// Zone name (e.g., example.com)
        zone: String,
    },

    /// Revoke a delegation and everything published under it
    Revoke {
        /// Zone name
        zone: String,
    },

    /// Publish A/AAAA records for a subdomain
    Claim {
        /// Subdomain (e.g., www.example.com)
        domain: String,

        /// Addresses to publish
        #[arg(required = true)]
        ips: Vec<IpAddr>,
    },

    /// Withdraw A/AAAA records from a subdomain
    Release {
        /// Subdomain
        domain: String,

        /// Addresses to withdraw
        #[arg(required = true)]
        ips: Vec<IpAddr>,
    },

    /// Show a zone's owner and labels, or a subdomain's records
    Show {
        /// Zone or subdomain
        name: String,
    },
}

// ============================================================================
// Route command
// ============================================================================

#[derive(Args, Debug)]
pub struct RouteArgs {
    #[command(subcommand)]
    pub command: RouteCommands,
}

#[derive(Subcommand, Debug)]
pub enum RouteCommands {
    /// Forward a domain to a backend address
    Forward {
        /// Domain to route
        domain: String,

        /// Backend address
        addr: String,

        /// Plain-text port
        #[arg(long, default_value = "80")]
        http_port: u16,

        /// TLS port
        #[arg(long, default_value = "443")]
        tls_port: u16,
    },

    /// Hand a domain to a reverse tunnel
    Reverse {
        /// Domain to route
        domain: String,

        /// Tunnel secret, `<user>:<random>`
        secret: String,

        /// The secret is hex ciphertext sealed to this gateway
        #[arg(long)]
        encrypted: bool,
    },

    /// Remove a domain's route
    Remove {
        /// Domain to unroute
        domain: String,
    },

    /// Show a domain's route
    Show {
        /// Domain
        domain: String,
    },
}

// ============================================================================
// Tunnel command
// ============================================================================

#[derive(Args, Debug)]
pub struct TunnelArgs {
    #[command(subcommand)]
    pub command: TunnelCommands,
}

#[derive(Subcommand, Debug)]
pub enum TunnelCommands {
    /// Create the tunnel namespace and interface
    Setup,

    /// Delete the tunnel namespace and interface
    Teardown,

    /// Grant a WireGuard key the acting user's address
    AddPeer {
        /// Client public key (base64)
        public_key: String,
    },

    /// Drop a WireGuard peer
    RemovePeer {
        /// Client public key (base64)
        public_key: String,
    },

    /// Show the address a user gets
    Address {
        /// User to look up (defaults to --user)
        user: Option<String>,
    },
}

// ============================================================================
// Workload command
// ============================================================================

#[derive(Args, Debug)]
pub struct WorkloadArgs {
    #[command(subcommand)]
    pub command: WorkloadCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkloadCommands {
    /// Deploy the workloads in a JSON file (one object or an array)
    Provision {
        /// Workload file
        file: PathBuf,
    },

    /// Remove the workloads in a JSON file
    Decommission {
        /// Workload file
        file: PathBuf,
    },
}
