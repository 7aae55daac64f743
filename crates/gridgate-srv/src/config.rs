//! Node configuration for a gateway.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gridgate_core::GatewayError;

/// Configuration for one gateway node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on a single authority call (seconds).
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Gateway key material and public name.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Where ownership tables live.
    #[serde(default)]
    pub store: StoreConfig,

    /// DNS record settings.
    #[serde(default)]
    pub dns: DnsConfig,

    /// 4to6 tunnel settings.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Where user public keys come from.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Gateway key material.
///
/// Exactly one of `seed` and `seed_path` is expected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// 32-byte seed as 64 hex characters.
    pub seed: Option<String>,

    /// File holding the seed, hex text or 32 raw bytes.
    pub seed_path: Option<PathBuf>,

    /// Explicit identity string; defaults to the hex ed25519 public key.
    pub name: Option<String>,
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `SQLite` database file, shareable between processes
    #[default]
    Sqlite,
    /// Process-local memory, lost on exit
    Memory,
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind (default: sqlite).
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// DNS record settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// TTL given to A/AAAA records created from subdomain claims.
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,
}

/// 4to6 tunnel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Serve `gateway-4to6` workloads.
    #[serde(default)]
    pub enabled: bool,

    /// Network namespace holding the interface.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// WireGuard interface name.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Public `host:port` clients dial; the port is also the listen port.
    pub endpoint: Option<String>,

    /// Persistent keepalive pushed with every peer.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

/// Identity directory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Explorer base URL, e.g. `https://explorer.grid.example/api/v1`.
    pub explorer_url: Option<String>,

    /// Fixed user -> hex X25519 public key entries, used when no explorer is set.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout(),
            identity: IdentityConfig::default(),
            store: StoreConfig::default(),
            dns: DnsConfig::default(),
            tunnel: TunnelConfig::default(),
            directory: DirectoryConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            record_ttl: default_record_ttl(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_namespace(),
            interface: default_interface(),
            endpoint: None,
            keepalive_secs: default_keepalive(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> gridgate_core::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| GatewayError::Config(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values no gateway can run with.
    pub fn validate(&self) -> gridgate_core::Result<()> {
        if self.operation_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "operation_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `<config dir>/gridgate/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridgate")
            .join("config.toml")
    }

    /// Per-call deadline as a `Duration`.
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl TunnelConfig {
    /// Listen port taken from the endpoint.
    pub fn listen_port(&self) -> gridgate_core::Result<u16> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| GatewayError::Config("tunnel.endpoint is not set".into()))?;
        let (_, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| GatewayError::Config(format!("tunnel endpoint '{endpoint}' has no port")))?;
        port.parse()
            .map_err(|_| GatewayError::Config(format!("tunnel endpoint '{endpoint}' has an invalid port")))
    }
}

// Default value functions for serde.
const fn default_operation_timeout() -> u64 {
    10
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridgate")
        .join("store.db")
}

const fn default_record_ttl() -> u32 {
    3600
}

fn default_namespace() -> String {
    String::from("gridgate")
}

fn default_interface() -> String {
    String::from("wg-gridgate")
}

const fn default_keepalive() -> u16 {
    25
}

fn default_log_level() -> String {
    String::from("info")
}
