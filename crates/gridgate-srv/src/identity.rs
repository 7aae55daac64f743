//! Gateway identity and key material.
//!
//! One 32-byte seed drives everything secret on the node: the ed25519
//! identity, the tunnel address pool, the WireGuard private key and the
//! X25519 static secret used to open reverse-proxy secrets.

use ring::signature::{Ed25519KeyPair, KeyPair};
use std::fmt;
use std::path::Path;
use x25519_dalek::{PublicKey, StaticSecret};

use gridgate_core::{GatewayError, Result, WgKey};

use crate::config::IdentityConfig;

/// The gateway's private seed.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewaySeed([u8; 32]);

impl GatewaySeed {
    /// Wrap raw seed bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters
    pub fn from_hex(text: &str) -> Result<Self> {
        let raw = hex::decode(text.trim())
            .map_err(|e| GatewayError::Config(format!("invalid seed hex: {e}")))?;
        Self::from_slice(&raw)
    }

    /// Read a seed file holding either hex text or 32 raw bytes
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        if raw.len() == 32 {
            return Self::from_slice(&raw);
        }
        let text = String::from_utf8(raw)
            .map_err(|_| GatewayError::Config(format!("seed file {} is not hex text", path.display())))?;
        Self::from_hex(&text)
    }

    fn from_slice(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = raw.try_into().map_err(|_| {
            GatewayError::Config(format!("seed must be 32 bytes, got {}", raw.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Raw seed bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for GatewaySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GatewaySeed(..)")
    }
}

/// Who this gateway is.
#[derive(Clone)]
pub struct GatewayIdentity {
    seed: GatewaySeed,
    public_key: [u8; 32],
    name: String,
}

impl GatewayIdentity {
    /// Derive the identity from a seed.
    ///
    /// Without an explicit `name` the identity string is the hex ed25519
    /// public key.
    pub fn from_seed(seed: GatewaySeed, name: Option<String>) -> Result<Self> {
        let pair = Ed25519KeyPair::from_seed_unchecked(seed.as_bytes())
            .map_err(|e| GatewayError::Config(format!("seed rejected: {e}")))?;
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(pair.public_key().as_ref());
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| hex::encode(public_key));
        Ok(Self {
            seed,
            public_key,
            name,
        })
    }

    /// Build from the `[identity]` config section
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let seed = match (&config.seed, &config.seed_path) {
            (Some(hex), _) => GatewaySeed::from_hex(hex)?,
            (None, Some(path)) => GatewaySeed::from_file(path)?,
            (None, None) => {
                return Err(GatewayError::Config(
                    "identity.seed or identity.seed_path must be set".into(),
                ))
            }
        };
        Self::from_seed(seed, config.name.clone())
    }

    /// Identity string recorded as owner of self-managed zones
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex ed25519 public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// The private seed
    pub const fn seed(&self) -> &GatewaySeed {
        &self.seed
    }

    /// X25519 secret used for ECDH and as the WireGuard private key
    pub fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(*self.seed.as_bytes())
    }

    /// WireGuard private key handed to the device
    pub const fn wireguard_private_key(&self) -> WgKey {
        WgKey::from_bytes(*self.seed.as_bytes())
    }

    /// WireGuard public key returned to tunnel clients
    pub fn wireguard_public_key(&self) -> WgKey {
        WgKey::from_bytes(PublicKey::from(&self.static_secret()).to_bytes())
    }
}

impl fmt::Debug for GatewayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayIdentity")
            .field("name", &self.name)
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_HEX: &str = "0707070707070707070707070707070707070707070707070707070707070707";

    #[test]
    fn test_default_name_is_public_key() {
        let id = GatewayIdentity::from_seed(GatewaySeed::from_hex(SEED_HEX).unwrap(), None).unwrap();
        assert_eq!(id.name(), id.public_key_hex());
        assert_eq!(id.name().len(), 64);
    }

    #[test]
    fn test_explicit_name() {
        let id = GatewayIdentity::from_seed(GatewaySeed::from_bytes([7; 32]), Some("G".into()))
            .unwrap();
        assert_eq!(id.name(), "G");
    }

    #[test]
    fn test_same_seed_same_keys() {
        let a = GatewayIdentity::from_seed(GatewaySeed::from_bytes([7; 32]), None).unwrap();
        let b = GatewayIdentity::from_seed(GatewaySeed::from_hex(SEED_HEX).unwrap(), None).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.wireguard_public_key(), b.wireguard_public_key());
        assert_ne!(a.wireguard_public_key(), a.wireguard_private_key());
    }

    #[test]
    fn test_seed_file_formats() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let text = dir.path().join("text");
        std::fs::write(&raw, [7u8; 32]).unwrap();
        std::fs::write(&text, format!("{SEED_HEX}\n")).unwrap();
        assert_eq!(GatewaySeed::from_file(&raw).unwrap(), GatewaySeed::from_bytes([7; 32]));
        assert_eq!(GatewaySeed::from_file(&text).unwrap(), GatewaySeed::from_bytes([7; 32]));
    }

    #[test]
    fn test_config_requires_seed() {
        let err = GatewayIdentity::from_config(&IdentityConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(GatewaySeed::from_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_hides_seed() {
        let id = GatewayIdentity::from_seed(GatewaySeed::from_bytes([7; 32]), None).unwrap();
        assert!(!format!("{id:?}").contains(SEED_HEX));
        assert_eq!(format!("{:?}", id.seed()), "GatewaySeed(..)");
    }
}
