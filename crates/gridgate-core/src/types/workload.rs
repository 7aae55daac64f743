//! Workload payloads handed to the gateway by the provisioning engine.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{GatewayError, Result};
use crate::types::{DomainName, WgKey};

/// Workload types a gateway can provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadType {
    /// TCP forward proxy
    GatewayProxy,
    /// Secret-gated reverse tunnel
    GatewayReverseProxy,
    /// Subdomain A/AAAA records
    GatewaySubdomain,
    /// Zone delegation
    GatewayDomainDelegate,
    /// IPv6-over-IPv4 WireGuard tunnel
    #[serde(rename = "gateway-4to6")]
    Gateway4To6,
}

impl WorkloadType {
    /// Wire name of the type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GatewayProxy => "gateway-proxy",
            Self::GatewayReverseProxy => "gateway-reverse-proxy",
            Self::GatewaySubdomain => "gateway-subdomain",
            Self::GatewayDomainDelegate => "gateway-domain-delegate",
            Self::Gateway4To6 => "gateway-4to6",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred deployment order when replaying workloads on boot.
///
/// Zones must exist before subdomains can be claimed in them.
pub const STARTUP_ORDER: [WorkloadType; 5] = [
    WorkloadType::GatewayDomainDelegate,
    WorkloadType::GatewaySubdomain,
    WorkloadType::GatewayProxy,
    WorkloadType::GatewayReverseProxy,
    WorkloadType::Gateway4To6,
];

/// A reservation as received from the provisioning engine.
///
/// The signature over the workload is verified upstream; `user` is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    /// Reservation identifier, used for logging only
    pub id: String,
    /// Primitive type, selects the payload schema
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    /// Requesting identity
    pub user: String,
    /// Type-specific payload
    pub data: serde_json::Value,
}

impl Workload {
    /// Decode and validate the payload.
    ///
    /// Malformed payloads are validation errors.
    pub fn decode<T: WorkloadData>(&self) -> Result<T> {
        let data: T = serde_json::from_value(self.data.clone()).map_err(|e| {
            GatewayError::validation(format!("invalid {} payload: {e}", self.workload_type))
        })?;
        data.validate()?;
        Ok(data)
    }
}

/// Implemented by every workload payload
pub trait WorkloadData: DeserializeOwned {
    /// Check the payload before any store or device is touched
    fn validate(&self) -> Result<()>;
}

/// `gateway-proxy` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayProxy {
    /// Domain to route
    pub domain: String,
    /// Backend address
    pub addr: String,
    /// Plain-text port
    pub port: u16,
    /// TLS port
    pub port_tls: u16,
}

impl WorkloadData for GatewayProxy {
    fn validate(&self) -> Result<()> {
        DomainName::parse(&self.domain)?;
        if self.addr.is_empty() {
            return Err(GatewayError::validation("proxy address cannot be empty"));
        }
        Ok(())
    }
}

/// `gateway-reverse-proxy` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayReverseProxy {
    /// Domain to route
    pub domain: String,
    /// Hex ciphertext of `<user>:<random>`
    pub secret: String,
}

impl WorkloadData for GatewayReverseProxy {
    fn validate(&self) -> Result<()> {
        if self.domain.is_empty() {
            return Err(GatewayError::validation("domain cannot be empty"));
        }
        DomainName::parse(&self.domain)?;
        if self.secret.is_empty() {
            return Err(GatewayError::validation("secret cannot be empty"));
        }
        Ok(())
    }
}

/// `gateway-subdomain` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySubdomain {
    /// Full subdomain
    pub domain: String,
    /// Addresses to publish
    pub ips: Vec<String>,
}

impl GatewaySubdomain {
    /// Parse the textual IP list
    pub fn parsed_ips(&self) -> Result<Vec<IpAddr>> {
        self.ips
            .iter()
            .map(|ip| {
                ip.parse()
                    .map_err(|_| GatewayError::validation(format!("invalid ip '{ip}'")))
            })
            .collect()
    }
}

impl WorkloadData for GatewaySubdomain {
    fn validate(&self) -> Result<()> {
        DomainName::parse(&self.domain)?;
        self.parsed_ips()?;
        Ok(())
    }
}

/// `gateway-domain-delegate` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayDelegate {
    /// Zone to delegate
    pub domain: String,
}

impl WorkloadData for GatewayDelegate {
    fn validate(&self) -> Result<()> {
        DomainName::parse(&self.domain).map(|_| ())
    }
}

/// `gateway-4to6` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway4To6 {
    /// Client WireGuard public key
    pub public_key: String,
}

impl WorkloadData for Gateway4To6 {
    fn validate(&self) -> Result<()> {
        WgKey::parse(&self.public_key).map(|_| ())
    }
}
