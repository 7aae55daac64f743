//! Narrow interface to the WireGuard device.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::sync::{Mutex, PoisonError};

use gridgate_core::{GatewayError, Result, WgKey};

use super::pool::Ipv6Cidr;

/// Interface parameters pushed on setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSetup {
    /// Gateway private key
    pub private_key: WgKey,
    /// UDP listen port
    pub listen_port: u16,
    /// Gateway address on the interface
    pub address: Ipv6Cidr,
}

/// One peer as pushed to the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Client public key
    pub public_key: WgKey,
    /// Single address routed to the peer, as a /128
    pub allowed_ip: Ipv6Addr,
    /// Persistent keepalive interval
    pub keepalive_secs: u16,
}

/// Mutations of the live WireGuard device.
///
/// The device itself is the peer table; implementations keep no copy of
/// their own. `upsert_peer` and `remove_peer` are idempotent.
#[async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Create the namespace and interface from scratch
    async fn setup(&self, config: &DeviceSetup) -> Result<()>;

    /// Add a peer or update it in place, leaving other peers untouched
    async fn upsert_peer(&self, peer: &PeerUpdate) -> Result<()>;

    /// Drop a peer; unknown keys are fine
    async fn remove_peer(&self, public_key: &WgKey) -> Result<()>;

    /// Delete the namespace and interface; a missing namespace is fine
    async fn teardown(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct DeviceState {
    config: Option<DeviceSetup>,
    peers: BTreeMap<String, PeerUpdate>,
}

/// Device kept in process memory.
///
/// Behaves like the kernel device for ownership purposes without touching
/// the host network; used for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    state: Mutex<DeviceState>,
}

impl MemoryDevice {
    /// A device that has not been set up
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true between setup and teardown
    pub fn is_up(&self) -> bool {
        self.lock().config.is_some()
    }

    /// Parameters of the last setup
    pub fn config(&self) -> Option<DeviceSetup> {
        self.lock().config.clone()
    }

    /// Current peer table, keyed by base64 public key
    pub fn peers(&self) -> BTreeMap<String, PeerUpdate> {
        self.lock().peers.clone()
    }
}

fn not_up() -> GatewayError {
    GatewayError::Device("tunnel device is not set up".into())
}

#[async_trait]
impl TunnelDevice for MemoryDevice {
    async fn setup(&self, config: &DeviceSetup) -> Result<()> {
        let mut state = self.lock();
        state.peers.clear();
        state.config = Some(config.clone());
        Ok(())
    }

    async fn upsert_peer(&self, peer: &PeerUpdate) -> Result<()> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(not_up());
        }
        state.peers.insert(peer.public_key.to_string(), peer.clone());
        Ok(())
    }

    async fn remove_peer(&self, public_key: &WgKey) -> Result<()> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(not_up());
        }
        state.peers.remove(&public_key.to_string());
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let mut state = self.lock();
        state.config = None;
        state.peers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> DeviceSetup {
        DeviceSetup {
            private_key: WgKey::from_bytes([1; 32]),
            listen_port: 51820,
            address: Ipv6Cidr {
                addr: "fd00::1".parse().unwrap(),
                prefix_len: 64,
            },
        }
    }

    fn peer(byte: u8) -> PeerUpdate {
        PeerUpdate {
            public_key: WgKey::from_bytes([byte; 32]),
            allowed_ip: Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, u16::from(byte)),
            keepalive_secs: 25,
        }
    }

    #[test]
    fn test_peers_require_setup() {
        let device = MemoryDevice::new();
        tokio_test::block_on(async {
            assert!(device.upsert_peer(&peer(2)).await.is_err());
            assert!(device.remove_peer(&WgKey::from_bytes([2; 32])).await.is_err());
        });
        assert!(!device.is_up());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let device = MemoryDevice::new();
        tokio_test::block_on(async {
            device.setup(&setup()).await.unwrap();
            device.upsert_peer(&peer(2)).await.unwrap();
            device.upsert_peer(&peer(3)).await.unwrap();

            let mut moved = peer(2);
            moved.allowed_ip = "fd00::99".parse().unwrap();
            device.upsert_peer(&moved).await.unwrap();
        });

        let peers = device.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[&WgKey::from_bytes([2; 32]).to_string()], moved_ip_peer());
    }

    fn moved_ip_peer() -> PeerUpdate {
        PeerUpdate {
            allowed_ip: "fd00::99".parse().unwrap(),
            ..peer(2)
        }
    }

    #[test]
    fn test_setup_starts_empty() {
        let device = MemoryDevice::new();
        tokio_test::block_on(async {
            device.setup(&setup()).await.unwrap();
            device.upsert_peer(&peer(2)).await.unwrap();
            device.setup(&setup()).await.unwrap();
        });
        assert!(device.is_up());
        assert!(device.peers().is_empty());
        assert_eq!(device.config(), Some(setup()));
    }
}
