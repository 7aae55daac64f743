//! Wiring a node together from its configuration.

use std::sync::Arc;
use tracing::info;

use gridgate_core::Result;
use gridgate_store::{ConfigStore, MemoryStore, SqliteStore};

use crate::authority::tunnel::{NetnsDevice, TunnelDevice};
use crate::authority::{DomainAuthority, RoutingAuthority, TunnelAuthority};
use crate::config::{GatewayConfig, StoreBackend};
use crate::crypto::{ExplorerDirectory, IdentityDirectory, StaticDirectory};
use crate::identity::GatewayIdentity;
use crate::provision::Provisioner;

/// Everything a gateway process drives
#[derive(Clone)]
pub struct Gateway {
    /// Node identity
    pub identity: GatewayIdentity,
    /// DNS zones and subdomains
    pub domains: DomainAuthority,
    /// TCP router services
    pub routes: RoutingAuthority,
    /// 4to6 tunnels, when enabled
    pub tunnel: Option<TunnelAuthority>,
    /// Workload dispatch over the three authorities
    pub provisioner: Provisioner,
}

/// Open the store named by the config
pub fn open_store(config: &GatewayConfig) -> Result<Arc<dyn ConfigStore>> {
    let store: Arc<dyn ConfigStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.store.path)?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

/// Build the identity directory named by the config
pub fn open_directory(config: &GatewayConfig) -> Result<Arc<dyn IdentityDirectory>> {
    let directory: Arc<dyn IdentityDirectory> = match &config.directory.explorer_url {
        Some(url) => Arc::new(ExplorerDirectory::new(url)?),
        None => Arc::new(StaticDirectory::from_hex(&config.directory.keys)?),
    };
    Ok(directory)
}

impl Gateway {
    /// Build a node from config with the real store, directory and device
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let identity = GatewayIdentity::from_config(&config.identity)?;
        let device: Option<Arc<dyn TunnelDevice>> = if config.tunnel.enabled {
            Some(Arc::new(NetnsDevice::new(
                &config.tunnel.namespace,
                &config.tunnel.interface,
            )?))
        } else {
            None
        };
        Self::with_parts(
            config,
            identity,
            open_store(config)?,
            open_directory(config)?,
            device,
        )
    }

    /// Build a node from explicit collaborators
    pub fn with_parts(
        config: &GatewayConfig,
        identity: GatewayIdentity,
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn IdentityDirectory>,
        device: Option<Arc<dyn TunnelDevice>>,
    ) -> Result<Self> {
        config.validate()?;
        let domains = DomainAuthority::new(Arc::clone(&store), identity.name(), config.dns.record_ttl);
        let routes = RoutingAuthority::new(store, directory, identity.static_secret());
        let tunnel = device
            .map(|device| TunnelAuthority::new(&identity, device, &config.tunnel))
            .transpose()?;
        let provisioner = Provisioner::new(
            domains.clone(),
            routes.clone(),
            tunnel.clone(),
            config.operation_timeout(),
        );
        info!(
            identity = %identity.name(),
            tunnel = tunnel.is_some(),
            "gateway assembled"
        );
        Ok(Self {
            identity,
            domains,
            routes,
            tunnel,
            provisioner,
        })
    }
}
