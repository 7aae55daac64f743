use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GatewayError, Result};

/// A WireGuard key (32 raw bytes, base64 in text form)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgKey([u8; 32]);

impl WgKey {
    /// Wrap raw key bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the base64 text form used by `wg(8)`
    pub fn parse(s: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(s.trim())
            .map_err(|e| GatewayError::validation(format!("invalid wireguard key: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            GatewayError::validation(format!(
                "invalid wireguard key: expected 32 bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for WgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

// Keys may be private; never print the bytes in debug output.
impl fmt::Debug for WgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WgKey(..)")
    }
}

impl std::str::FromStr for WgKey {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A WireGuard peer as presented to a tunnel client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Base64 public key of the peer
    pub public_key: String,
    /// `host:port` the client should dial
    pub endpoint: String,
    /// CIDRs routed through this peer
    pub allowed_ips: Vec<String>,
}

/// Configuration a tunnel client needs to bring up its side of the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Addresses assigned to the client
    pub ips: Vec<String>,
    /// Peers the client should trust (the gateway itself)
    pub peers: Vec<Peer>,
}
