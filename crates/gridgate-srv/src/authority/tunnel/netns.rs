//! Kernel WireGuard device inside a dedicated network namespace.
//!
//! Drives `ip(8)` and `wg(8)`; needs `CAP_NET_ADMIN`. Command lines are built
//! by plain functions so they can be checked without root.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use gridgate_core::{GatewayError, Result, WgKey};

use super::device::{DeviceSetup, PeerUpdate, TunnelDevice};

/// Kernel limit on interface names, excluding the NUL
const IFNAMSIZ: usize = 15;

/// Directory where `ip netns` keeps named namespaces
const NETNS_RUN_DIR: &str = "/run/netns";

/// Interfaces of the namespace this process runs in
const SYS_CLASS_NET: &str = "/sys/class/net";

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable
    pub program: &'static str,
    /// Arguments
    pub args: Vec<String>,
    /// Fed to stdin, then stdin is closed
    pub stdin: Option<String>,
}

impl CommandLine {
    fn new(program: &'static str, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(ToString::to_string).collect(),
            stdin: None,
        }
    }

    fn with_stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// What an interrupted setup may have left behind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Leftovers {
    /// The named namespace exists
    pub namespace: bool,
    /// An interface with our name exists in the root namespace
    pub root_link: bool,
}

/// Commands removing leftovers, run before setup
pub fn cleanup_commands(namespace: &str, interface: &str, leftovers: Leftovers) -> Vec<CommandLine> {
    let mut cmds = Vec::new();
    if leftovers.root_link {
        cmds.push(CommandLine::new("ip", &["link", "del", "dev", interface]));
    }
    if leftovers.namespace {
        cmds.push(delete_namespace_command(namespace));
    }
    cmds
}

/// Commands creating the namespace and interface, in order.
///
/// The interface is created inside the namespace, so deleting the namespace
/// always takes the interface with it.
pub fn setup_commands(namespace: &str, interface: &str, setup: &DeviceSetup) -> Vec<CommandLine> {
    let port = setup.listen_port.to_string();
    let address = setup.address.to_string();
    vec![
        CommandLine::new("ip", &["netns", "add", namespace]),
        CommandLine::new(
            "ip",
            &["-n", namespace, "link", "add", "dev", interface, "type", "wireguard"],
        ),
        CommandLine::new(
            "ip",
            &["netns", "exec", namespace, "sysctl", "-w", "net.ipv6.conf.all.forwarding=1"],
        ),
        CommandLine::new("ip", &["-n", namespace, "link", "set", "dev", "lo", "up"]),
        CommandLine::new("ip", &["-n", namespace, "addr", "add", &address, "dev", interface]),
        CommandLine::new(
            "ip",
            &[
                "netns", "exec", namespace, "wg", "set", interface, "private-key", "/dev/stdin",
                "listen-port", &port,
            ],
        )
        .with_stdin(setup.private_key.to_string()),
        CommandLine::new("ip", &["-n", namespace, "link", "set", "dev", interface, "up"]),
    ]
}

/// Command adding or updating one peer
pub fn upsert_peer_command(namespace: &str, interface: &str, peer: &PeerUpdate) -> CommandLine {
    let key = peer.public_key.to_string();
    let allowed = format!("{}/128", peer.allowed_ip);
    let keepalive = peer.keepalive_secs.to_string();
    CommandLine::new(
        "ip",
        &[
            "netns", "exec", namespace, "wg", "set", interface, "peer", &key, "allowed-ips",
            &allowed, "persistent-keepalive", &keepalive,
        ],
    )
}

/// Command dropping one peer
pub fn remove_peer_command(namespace: &str, interface: &str, public_key: &WgKey) -> CommandLine {
    let key = public_key.to_string();
    CommandLine::new(
        "ip",
        &["netns", "exec", namespace, "wg", "set", interface, "peer", &key, "remove"],
    )
}

/// Command deleting the namespace, and with it the interface
pub fn delete_namespace_command(namespace: &str) -> CommandLine {
    CommandLine::new("ip", &["netns", "delete", namespace])
}

async fn run(cmd: &CommandLine) -> Result<()> {
    debug!(command = %cmd, "running");
    let mut child = Command::new(cmd.program)
        .args(&cmd.args)
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GatewayError::Device(format!("failed to spawn {}: {e}", cmd.program)))?;

    if let (Some(input), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| GatewayError::Device(format!("failed to write stdin of `{cmd}`: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| GatewayError::Device(format!("`{cmd}` did not finish: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GatewayError::Device(format!(
            "`{cmd}` failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// WireGuard device managed through `ip` and `wg`
#[derive(Debug, Clone)]
pub struct NetnsDevice {
    namespace: String,
    interface: String,
}

impl NetnsDevice {
    /// Device named `interface` living in namespace `namespace`
    pub fn new(namespace: impl Into<String>, interface: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let interface = interface.into();
        let valid = |s: &str| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        };
        if !valid(&namespace) {
            return Err(GatewayError::Config(format!("invalid namespace name '{namespace}'")));
        }
        if !valid(&interface) || interface.len() > IFNAMSIZ {
            return Err(GatewayError::Config(format!("invalid interface name '{interface}'")));
        }
        Ok(Self {
            namespace,
            interface,
        })
    }

    fn namespace_path(&self) -> PathBuf {
        PathBuf::from(NETNS_RUN_DIR).join(&self.namespace)
    }

    async fn namespace_exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.namespace_path()).await?)
    }

    async fn leftovers(&self) -> Result<Leftovers> {
        let root_link = PathBuf::from(SYS_CLASS_NET).join(&self.interface);
        Ok(Leftovers {
            namespace: self.namespace_exists().await?,
            root_link: tokio::fs::try_exists(root_link).await?,
        })
    }

    async fn create(&self, config: &DeviceSetup) -> Result<()> {
        for cmd in setup_commands(&self.namespace, &self.interface, config) {
            run(&cmd).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TunnelDevice for NetnsDevice {
    async fn setup(&self, config: &DeviceSetup) -> Result<()> {
        let leftovers = self.leftovers().await?;
        if leftovers != Leftovers::default() {
            warn!(
                namespace = %self.namespace,
                interface = %self.interface,
                stale_namespace = leftovers.namespace,
                stale_link = leftovers.root_link,
                "removing leftovers of an earlier setup"
            );
        }
        for cmd in cleanup_commands(&self.namespace, &self.interface, leftovers) {
            run(&cmd).await?;
        }

        if let Err(e) = self.create(config).await {
            if self.namespace_exists().await.unwrap_or(false) {
                if let Err(cleanup) = run(&delete_namespace_command(&self.namespace)).await {
                    warn!(namespace = %self.namespace, error = %cleanup, "rollback of failed setup failed");
                }
            }
            return Err(e);
        }
        info!(
            namespace = %self.namespace,
            interface = %self.interface,
            address = %config.address,
            port = config.listen_port,
            "wireguard namespace ready"
        );
        Ok(())
    }

    async fn upsert_peer(&self, peer: &PeerUpdate) -> Result<()> {
        run(&upsert_peer_command(&self.namespace, &self.interface, peer)).await
    }

    async fn remove_peer(&self, public_key: &WgKey) -> Result<()> {
        run(&remove_peer_command(&self.namespace, &self.interface, public_key)).await
    }

    async fn teardown(&self) -> Result<()> {
        if !self.namespace_exists().await? {
            debug!(namespace = %self.namespace, "namespace already gone");
            return Ok(());
        }
        run(&delete_namespace_command(&self.namespace)).await?;
        info!(namespace = %self.namespace, "wireguard namespace removed");
        Ok(())
    }
}
