//! Dispatcher boundary: typed workloads in, authority calls out.
//!
//! The provisioning engine hands over a [`Workload`]; the payload is decoded
//! and validated here, routed to the matching authority, and bounded by the
//! configured deadline. Dropping the returned future cancels the call, except
//! for a self-managed label claim, which completes on its own task.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use gridgate_core::{
    Gateway4To6, GatewayDelegate, GatewayError, GatewayProxy, GatewayReverseProxy,
    GatewaySubdomain, PeerConfig, Result, Workload, WorkloadType, STARTUP_ORDER,
};

use crate::authority::{DomainAuthority, ReverseSecret, RoutingAuthority, TunnelAuthority};

/// What a successful provision hands back upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProvisionOutcome {
    /// Nothing to report
    Done,
    /// Client side of a 4to6 tunnel
    Tunnel(PeerConfig),
}

/// Maps workload types to authority operations.
#[derive(Clone)]
pub struct Provisioner {
    domains: DomainAuthority,
    routes: RoutingAuthority,
    tunnel: Option<TunnelAuthority>,
    timeout: Duration,
}

impl Provisioner {
    /// `tunnel` is `None` when 4to6 is disabled on this node.
    pub const fn new(
        domains: DomainAuthority,
        routes: RoutingAuthority,
        tunnel: Option<TunnelAuthority>,
        timeout: Duration,
    ) -> Self {
        Self {
            domains,
            routes,
            tunnel,
            timeout,
        }
    }

    /// Workload types this node accepts
    pub fn supported(&self) -> Vec<WorkloadType> {
        STARTUP_ORDER
            .into_iter()
            .filter(|t| *t != WorkloadType::Gateway4To6 || self.tunnel.is_some())
            .collect()
    }

    fn tunnel(&self) -> Result<&TunnelAuthority> {
        self.tunnel
            .as_ref()
            .ok_or_else(|| GatewayError::Unsupported(WorkloadType::Gateway4To6.to_string()))
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs()))?
    }

    /// Deploy a workload
    pub async fn provision(&self, wl: &Workload) -> Result<ProvisionOutcome> {
        info!(id = %wl.id, user = %wl.user, workload_type = %wl.workload_type, "provision");
        let user = wl.user.as_str();
        let outcome = match wl.workload_type {
            WorkloadType::GatewayProxy => {
                let data: GatewayProxy = wl.decode()?;
                self.bounded(self.routes.register_forward(
                    user,
                    &data.domain,
                    &data.addr,
                    data.port,
                    data.port_tls,
                ))
                .await?;
                ProvisionOutcome::Done
            }
            WorkloadType::GatewayReverseProxy => {
                let data: GatewayReverseProxy = wl.decode()?;
                self.bounded(self.routes.register_reverse(
                    user,
                    &data.domain,
                    ReverseSecret::Encrypted(data.secret),
                ))
                .await?;
                ProvisionOutcome::Done
            }
            WorkloadType::GatewaySubdomain => {
                let data: GatewaySubdomain = wl.decode()?;
                let ips = data.parsed_ips()?;
                self.bounded(self.domains.claim(user, &data.domain, &ips))
                    .await?;
                ProvisionOutcome::Done
            }
            WorkloadType::GatewayDomainDelegate => {
                let data: GatewayDelegate = wl.decode()?;
                self.bounded(self.domains.delegate(user, &data.domain))
                    .await?;
                ProvisionOutcome::Done
            }
            WorkloadType::Gateway4To6 => {
                let tunnel = self.tunnel()?;
                let data: Gateway4To6 = wl.decode()?;
                let cfg = self
                    .bounded(tunnel.add_peer(user, &data.public_key))
                    .await?;
                ProvisionOutcome::Tunnel(cfg)
            }
        };
        Ok(outcome)
    }

    /// Remove a workload; removing something already gone succeeds
    pub async fn decommission(&self, wl: &Workload) -> Result<()> {
        info!(id = %wl.id, user = %wl.user, workload_type = %wl.workload_type, "decommission");
        let user = wl.user.as_str();
        match wl.workload_type {
            WorkloadType::GatewayProxy => {
                let data: GatewayProxy = wl.decode()?;
                self.bounded(self.routes.deregister(user, &data.domain))
                    .await
            }
            WorkloadType::GatewayReverseProxy => {
                let data: GatewayReverseProxy = wl.decode()?;
                self.bounded(self.routes.deregister(user, &data.domain))
                    .await
            }
            WorkloadType::GatewaySubdomain => {
                let data: GatewaySubdomain = wl.decode()?;
                let ips = data.parsed_ips()?;
                self.bounded(self.domains.release(user, &data.domain, &ips))
                    .await
            }
            WorkloadType::GatewayDomainDelegate => {
                let data: GatewayDelegate = wl.decode()?;
                self.bounded(self.domains.revoke(user, &data.domain)).await
            }
            WorkloadType::Gateway4To6 => {
                let tunnel = self.tunnel()?;
                let data: Gateway4To6 = wl.decode()?;
                self.bounded(tunnel.remove_peer(&data.public_key)).await
            }
        }
    }

    /// Provision a batch in startup order, collecting per-workload results.
    ///
    /// One failure does not stop the others.
    pub async fn provision_all(
        &self,
        mut workloads: Vec<Workload>,
    ) -> Vec<(Workload, Result<ProvisionOutcome>)> {
        sort_for_startup(&mut workloads);
        let mut results = Vec::with_capacity(workloads.len());
        for wl in workloads {
            let result = self.provision(&wl).await;
            if let Err(e) = &result {
                warn!(id = %wl.id, error = %e, "workload failed");
            }
            results.push((wl, result));
        }
        results
    }
}

/// Order workloads so zones exist before subdomains are claimed in them
pub fn sort_for_startup(workloads: &mut [Workload]) {
    workloads.sort_by_key(|wl| {
        STARTUP_ORDER
            .iter()
            .position(|t| *t == wl.workload_type)
            .unwrap_or(STARTUP_ORDER.len())
    });
}
