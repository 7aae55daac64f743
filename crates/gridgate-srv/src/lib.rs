//! gridgate-srv: control plane of a grid gateway node.
//!
//! Users reserve three kinds of network primitives on a gateway; this crate
//! records who owns what and turns each reservation into live configuration.
//!
//! # Architecture
//!
//! Three ownership-gated authorities, sharing nothing but the store:
//! - [`DomainAuthority`] - zone delegation and subdomain A/AAAA records,
//!   read by the DNS server
//! - [`RoutingAuthority`] - TCP forward and secret-gated reverse-tunnel
//!   services, read by the TCP router
//! - [`TunnelAuthority`] - seed-derived IPv6 addresses and WireGuard peers
//!   inside a dedicated network namespace
//!
//! The [`Provisioner`] sits at the boundary with the provisioning engine:
//! it decodes workloads, calls the authorities and bounds every call with a
//! deadline.

pub mod authority;
pub mod config;
pub mod crypto;
pub mod gateway;
pub mod identity;
pub mod provision;
pub mod telemetry;

// Re-exports for convenience.
pub use authority::{DomainAuthority, ReverseSecret, RoutingAuthority, TunnelAuthority};
pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use identity::{GatewayIdentity, GatewaySeed};
pub use provision::{ProvisionOutcome, Provisioner};
