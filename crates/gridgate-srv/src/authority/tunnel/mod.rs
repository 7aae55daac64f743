//! Tunnel authority: 4to6 WireGuard peers.
//!
//! There is no ownership table. A user's address is derived from the
//! gateway seed, so re-adding a peer always lands on the same address, and
//! the kernel peer table is the only record of who is connected.

pub mod device;
pub mod netns;
pub mod pool;

pub use device::{DeviceSetup, MemoryDevice, PeerUpdate, TunnelDevice};
pub use netns::NetnsDevice;
pub use pool::{derive_address, AddressPool, Ipv6Cidr};

use std::net::Ipv6Addr;
use std::sync::Arc;
use tracing::info;

use gridgate_core::{GatewayError, Peer, PeerConfig, Result, WgKey};

use super::require_user;
use crate::config::TunnelConfig;
use crate::identity::GatewayIdentity;

/// WireGuard peer lifecycle for 4to6 clients.
#[derive(Clone)]
pub struct TunnelAuthority {
    device: Arc<dyn TunnelDevice>,
    pool: AddressPool,
    private_key: WgKey,
    public_key: WgKey,
    endpoint: String,
    listen_port: u16,
    keepalive_secs: u16,
}

impl TunnelAuthority {
    /// Keys and pool come from `identity`; `config.endpoint` is required.
    pub fn new(
        identity: &GatewayIdentity,
        device: Arc<dyn TunnelDevice>,
        config: &TunnelConfig,
    ) -> Result<Self> {
        let listen_port = config.listen_port()?;
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| GatewayError::Config("tunnel.endpoint is not set".into()))?;
        Ok(Self {
            device,
            pool: AddressPool::new(*identity.seed().as_bytes()),
            private_key: identity.wireguard_private_key(),
            public_key: identity.wireguard_public_key(),
            endpoint,
            listen_port,
            keepalive_secs: config.keepalive_secs,
        })
    }

    /// Address allocated to `user`
    pub fn address(&self, user: &str) -> Ipv6Addr {
        self.pool.address(user)
    }

    /// The address pool
    pub const fn pool(&self) -> &AddressPool {
        &self.pool
    }

    /// Gateway WireGuard public key
    pub const fn public_key(&self) -> &WgKey {
        &self.public_key
    }

    /// Create the namespace and interface
    pub async fn setup(&self) -> Result<()> {
        let setup = DeviceSetup {
            private_key: self.private_key,
            listen_port: self.listen_port,
            address: self.pool.gateway(),
        };
        self.device.setup(&setup).await?;
        info!(gateway = %setup.address, port = self.listen_port, "tunnel device set up");
        Ok(())
    }

    /// Grant `public_key` the address of `user`.
    ///
    /// Returns what the client needs: its address and the gateway as sole
    /// peer, routing `::/0`.
    pub async fn add_peer(&self, user: &str, public_key: &str) -> Result<PeerConfig> {
        require_user(user)?;
        let key = WgKey::parse(public_key)?;
        let ip = self.pool.address(user);

        self.device
            .upsert_peer(&PeerUpdate {
                public_key: key,
                allowed_ip: ip,
                keepalive_secs: self.keepalive_secs,
            })
            .await?;
        info!(user, public_key = %key, address = %ip, "tunnel peer added");

        Ok(PeerConfig {
            ips: vec![ip.to_string()],
            peers: vec![Peer {
                public_key: self.public_key.to_string(),
                endpoint: self.endpoint.clone(),
                allowed_ips: vec!["::/0".into()],
            }],
        })
    }

    /// Drop the peer with `public_key`; unknown keys are fine
    pub async fn remove_peer(&self, public_key: &str) -> Result<()> {
        let key = WgKey::parse(public_key)?;
        self.device.remove_peer(&key).await?;
        info!(public_key = %key, "tunnel peer removed");
        Ok(())
    }

    /// Delete the namespace and interface
    pub async fn teardown(&self) -> Result<()> {
        self.device.teardown().await?;
        info!("tunnel device torn down");
        Ok(())
    }
}
