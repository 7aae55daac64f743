//! Domain authority: zone delegation and subdomain record claims.
//!
//! Store layout, read by the DNS server:
//!
//! - `zone:<zone>.` holds `{"owner": "<user>"}`; absent means unclaimed
//! - the hash `<zone>.` maps each label to its record set
//! - the hash `managed_domains` maps `<label>.<zone>` to its claimant, only
//!   for zones owned by the gateway itself (self-managed)
//!
//! A zone delegated to a user is fully controlled by that user. A
//! self-managed zone hands out labels on a first-claim basis; a label is
//! free again once its last record is released.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use gridgate_core::{DomainName, GatewayError, Record, RecordSet, Result};
use gridgate_store::ConfigStore;

use super::{contended, require_user, CLAIM_ATTEMPTS};

/// Hash of label claims in self-managed zones.
pub const MANAGED_DOMAINS: &str = "managed_domains";

/// Store key of the owner record for `zone`
pub fn zone_key(zone: &DomainName) -> String {
    format!("zone:{}", zone.fqdn())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ZoneOwner {
    #[serde(default)]
    owner: String,
}

/// Who controls a zone, as seen by one caller
#[derive(Debug, Clone, PartialEq, Eq)]
enum Control {
    Unclaimed,
    SelfManaged,
    Delegated(String),
}

/// Zone delegation and subdomain records.
#[derive(Clone)]
pub struct DomainAuthority {
    store: Arc<dyn ConfigStore>,
    identity: String,
    record_ttl: u32,
}

impl DomainAuthority {
    /// `identity` is the gateway's own identity string; zones delegated to it
    /// are self-managed.
    pub fn new(store: Arc<dyn ConfigStore>, identity: impl Into<String>, record_ttl: u32) -> Self {
        Self {
            store,
            identity: identity.into(),
            record_ttl,
        }
    }

    /// The gateway identity this authority treats as self-managed owner
    pub fn identity(&self) -> &str {
        &self.identity
    }

    async fn read_owner(&self, zone: &DomainName) -> Result<(Option<Vec<u8>>, String)> {
        let raw = self.store.get(&zone_key(zone)).await?;
        let owner = match &raw {
            Some(bytes) => serde_json::from_slice::<ZoneOwner>(bytes)?.owner,
            None => String::new(),
        };
        Ok((raw, owner))
    }

    async fn control(&self, zone: &DomainName) -> Result<Control> {
        let (_, owner) = self.read_owner(zone).await?;
        Ok(if owner.is_empty() {
            Control::Unclaimed
        } else if owner == self.identity {
            Control::SelfManaged
        } else {
            Control::Delegated(owner)
        })
    }

    /// Delegate `domain` to `user`.
    ///
    /// Succeeds if the zone is unclaimed or already owned by `user`.
    pub async fn delegate(&self, user: &str, domain: &str) -> Result<()> {
        require_user(user)?;
        let zone = DomainName::parse(domain)?;
        let key = zone_key(&zone);
        let value = serde_json::to_vec(&ZoneOwner {
            owner: user.to_string(),
        })?;

        for _ in 0..CLAIM_ATTEMPTS {
            let (raw, owner) = self.read_owner(&zone).await?;
            if owner == user {
                debug!(user, zone = %zone, "zone already delegated to user");
                return Ok(());
            }
            if !owner.is_empty() {
                warn!(user, zone = %zone, owner = %owner, "delegation rejected");
                return Err(GatewayError::unauthorized("delegate domain", zone.as_str()));
            }
            if self
                .store
                .compare_and_set(&key, raw.as_deref(), Some(value.clone()))
                .await?
            {
                // an unclaimed zone starts empty, whatever a claim racing the
                // last revoke left behind
                self.clear_zone(&zone).await?;
                info!(user, zone = %zone, "zone delegated");
                return Ok(());
            }
            debug!(zone = %zone, "zone owner changed during delegation, re-checking");
        }
        Err(contended(&key))
    }

    /// Revoke the delegation of `domain`.
    ///
    /// Clears the owner record, then every record set and self-managed
    /// label claim under the zone. Unclaimed zones are a no-op.
    pub async fn revoke(&self, user: &str, domain: &str) -> Result<()> {
        require_user(user)?;
        let zone = DomainName::parse(domain)?;
        let key = zone_key(&zone);

        let mut released = false;
        for _ in 0..CLAIM_ATTEMPTS {
            let (raw, owner) = self.read_owner(&zone).await?;
            if owner.is_empty() && raw.is_none() {
                debug!(user, zone = %zone, "zone not delegated, nothing to revoke");
                return Ok(());
            }
            if !owner.is_empty() && owner != user {
                warn!(user, zone = %zone, owner = %owner, "revocation rejected");
                return Err(GatewayError::unauthorized("remove delegated domain", zone.as_str()));
            }
            if self.store.compare_and_set(&key, raw.as_deref(), None).await? {
                released = true;
                break;
            }
            debug!(zone = %zone, "zone owner changed during revocation, re-checking");
        }
        if !released {
            return Err(contended(&key));
        }

        self.clear_zone(&zone).await?;
        info!(user, zone = %zone, "zone revoked");
        Ok(())
    }

    async fn clear_zone(&self, zone: &DomainName) -> Result<()> {
        let labels = self.store.hkeys(&zone.fqdn()).await?;
        self.store.delete(&zone.fqdn()).await?;

        let mut claims = 0usize;
        for claimed in self.store.hkeys(MANAGED_DOMAINS).await? {
            let Ok(name) = DomainName::parse(&claimed) else {
                continue;
            };
            if name.split_label().1 == *zone && self.store.hdel(MANAGED_DOMAINS, &claimed).await? {
                claims += 1;
            }
        }
        debug!(zone = %zone, labels = labels.len(), claims, "zone contents cleared");
        Ok(())
    }

    /// Add A/AAAA records for `ips` under `domain`.
    ///
    /// The zone (the name minus its first label) must be delegated. In a
    /// self-managed zone the first user to claim a label owns it.
    pub async fn claim(&self, user: &str, domain: &str, ips: &[IpAddr]) -> Result<()> {
        require_user(user)?;
        let name = DomainName::parse(domain)?;
        if ips.is_empty() {
            return Err(GatewayError::validation("at least one ip is required"));
        }
        let (label, zone) = name.split_label();

        match self.control(&zone).await? {
            Control::Unclaimed => Err(GatewayError::NotFound {
                resource: format!("zone {zone} (delegate the domain first)"),
            }),
            Control::SelfManaged => {
                // detached: a dropped caller must not stop between the label
                // claim and the record write
                let this = self.clone();
                let user = user.to_string();
                let ips = ips.to_vec();
                tokio::spawn(async move { this.claim_self_managed(&user, &name, &ips).await })
                    .await
                    .map_err(|e| GatewayError::Storage(format!("label claim task failed: {e}")))?
            }
            Control::Delegated(owner) if owner == user => self.add_records(user, &name, ips).await,
            Control::Delegated(owner) => {
                warn!(user, domain = %name, owner = %owner, "subdomain claim rejected");
                Err(GatewayError::unauthorized(
                    format!("add subdomain {label} to zone"),
                    zone.as_str(),
                ))
            }
        }
    }

    async fn claim_self_managed(&self, user: &str, name: &DomainName, ips: &[IpAddr]) -> Result<()> {
        let fresh = self.claim_label(user, name).await?;
        let result = self.add_records(user, name, ips).await;
        if result.is_err() && fresh {
            match self.store.hdel(MANAGED_DOMAINS, name.as_str()).await {
                Ok(_) => warn!(user, domain = %name, "records not written, label claim undone"),
                Err(e) => warn!(
                    user,
                    domain = %name,
                    error = %e,
                    "records not written, label claim left in place"
                ),
            }
        }
        result
    }

    /// Returns true if this call created the claim.
    async fn claim_label(&self, user: &str, name: &DomainName) -> Result<bool> {
        for _ in 0..CLAIM_ATTEMPTS {
            let claimant = self.claimant(name).await?;
            match claimant.as_deref() {
                Some(c) if c == user => return Ok(false),
                Some(c) => {
                    warn!(user, domain = %name, claimant = %c, "label already claimed");
                    let (_, zone) = name.split_label();
                    return Err(GatewayError::unauthorized(
                        format!("add subdomain {name} to zone"),
                        zone.as_str(),
                    ));
                }
                None => {}
            }
            if self
                .store
                .hset_if_absent(MANAGED_DOMAINS, name.as_str(), user.as_bytes().to_vec())
                .await?
            {
                info!(user, domain = %name, "label claimed in self-managed zone");
                return Ok(true);
            }
        }
        Err(contended(MANAGED_DOMAINS))
    }

    async fn add_records(&self, user: &str, name: &DomainName, ips: &[IpAddr]) -> Result<()> {
        let (label, zone) = name.split_label();
        let mut set = self.read_records(&zone, &label).await?;
        let added = ips
            .iter()
            .filter(|ip| set.add(Record::from_ip(**ip, self.record_ttl)))
            .count();
        if added == 0 {
            debug!(user, domain = %name, "records already present");
            return Ok(());
        }
        self.store
            .hset(&zone.fqdn(), &label, serde_json::to_vec(&set)?)
            .await?;
        info!(user, domain = %name, zone = %zone, label = %label, added, "subdomain records added");
        Ok(())
    }

    /// Remove the A/AAAA records for `ips` from `domain`.
    ///
    /// Absent records and unclaimed zones are no-ops. In a self-managed zone
    /// the label is freed once its record set is empty.
    pub async fn release(&self, user: &str, domain: &str, ips: &[IpAddr]) -> Result<()> {
        require_user(user)?;
        let name = DomainName::parse(domain)?;
        let (label, zone) = name.split_label();

        let self_managed = match self.control(&zone).await? {
            Control::Unclaimed => {
                debug!(user, domain = %name, "zone not delegated, nothing to release");
                return Ok(());
            }
            Control::SelfManaged => {
                if let Some(c) = self.claimant(&name).await? {
                    if c != user {
                        warn!(user, domain = %name, claimant = %c, "subdomain release rejected");
                        return Err(GatewayError::unauthorized(
                            format!("remove subdomain {label} from zone"),
                            zone.as_str(),
                        ));
                    }
                }
                true
            }
            Control::Delegated(owner) if owner == user => false,
            Control::Delegated(owner) => {
                warn!(user, domain = %name, owner = %owner, "subdomain release rejected");
                return Err(GatewayError::unauthorized(
                    format!("remove subdomain {label} from zone"),
                    zone.as_str(),
                ));
            }
        };

        let mut set = self.read_records(&zone, &label).await?;
        let removed = ips
            .iter()
            .filter(|ip| set.remove(&Record::from_ip(**ip, self.record_ttl)))
            .count();

        if set.is_empty() {
            self.store.hdel(&zone.fqdn(), &label).await?;
            if self_managed && self.store.hdel(MANAGED_DOMAINS, name.as_str()).await? {
                info!(user, domain = %name, "label freed");
            }
        } else if removed > 0 {
            self.store
                .hset(&zone.fqdn(), &label, serde_json::to_vec(&set)?)
                .await?;
        }

        if removed > 0 {
            info!(user, domain = %name, removed, "subdomain records removed");
        } else {
            debug!(user, domain = %name, "no matching records to remove");
        }
        Ok(())
    }

    async fn read_records(&self, zone: &DomainName, label: &str) -> Result<RecordSet> {
        match self.store.hget(&zone.fqdn(), label).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(RecordSet::new()),
        }
    }

    /// Records currently published for `domain`
    pub async fn records(&self, domain: &str) -> Result<RecordSet> {
        let name = DomainName::parse(domain)?;
        let (label, zone) = name.split_label();
        self.read_records(&zone, &label).await
    }

    /// Labels with records under `zone`, sorted
    pub async fn labels(&self, zone: &str) -> Result<Vec<String>> {
        let zone = DomainName::parse(zone)?;
        Ok(self.store.hkeys(&zone.fqdn()).await?)
    }

    /// Owner of `zone`, if delegated
    pub async fn zone_owner(&self, zone: &str) -> Result<Option<String>> {
        let zone = DomainName::parse(zone)?;
        let (_, owner) = self.read_owner(&zone).await?;
        Ok(Some(owner).filter(|o| !o.is_empty()))
    }

    /// Claimant of a label in a self-managed zone
    pub async fn claimant(&self, domain: &DomainName) -> Result<Option<String>> {
        let raw = self.store.hget(MANAGED_DOMAINS, domain.as_str()).await?;
        raw.map(|bytes| {
            String::from_utf8(bytes)
                .map_err(|_| GatewayError::Storage(format!("claimant of {domain} is not utf-8")))
        })
        .transpose()
        .map(|c| c.filter(|c| !c.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridgate_core::RecordType;
    use gridgate_store::{MemoryStore, StoreError, StoreResult};
    use std::time::Duration;

    const GATEWAY: &str = "G";

    fn authority() -> (Arc<MemoryStore>, DomainAuthority) {
        let store = Arc::new(MemoryStore::new());
        let auth = DomainAuthority::new(store.clone(), GATEWAY, 3600);
        (store, auth)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    /// How [`RecordWrites`] treats writes of record sets
    #[derive(Clone, Copy)]
    enum RecordWrite {
        Fail,
        Slow(Duration),
    }

    /// Memory store whose record-set writes fail or stall.
    ///
    /// Writes to `managed_domains` pass through untouched.
    struct RecordWrites {
        inner: MemoryStore,
        mode: RecordWrite,
    }

    #[async_trait]
    impl ConfigStore for RecordWrites {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> StoreResult<bool> {
            self.inner.delete(key).await
        }

        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<&[u8]>,
            new: Option<Vec<u8>>,
        ) -> StoreResult<bool> {
            self.inner.compare_and_set(key, expected, new).await
        }

        async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.hget(key, field).await
        }

        async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
            if key != MANAGED_DOMAINS {
                match self.mode {
                    RecordWrite::Fail => {
                        return Err(StoreError::Task("connection reset".into()));
                    }
                    RecordWrite::Slow(delay) => tokio::time::sleep(delay).await,
                }
            }
            self.inner.hset(key, field, value).await
        }

        async fn hset_if_absent(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<bool> {
            self.inner.hset_if_absent(key, field, value).await
        }

        async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
            self.inner.hdel(key, field).await
        }

        async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
            self.inner.hkeys(key).await
        }
    }

    #[tokio::test]
    async fn test_delegate_is_exclusive_until_revoked() {
        let (_, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        auth.delegate("alice", "example.com").await.unwrap();

        let err = auth.delegate("bob", "example.com").await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(auth.revoke("bob", "example.com").await.unwrap_err().is_auth_error());

        auth.revoke("alice", "example.com").await.unwrap();
        auth.delegate("bob", "example.com").await.unwrap();
        assert_eq!(
            auth.zone_owner("example.com").await.unwrap().as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn test_delegate_validates_before_touching_store() {
        let (store, auth) = authority();
        for bad in ["", "com", ".example.com", "example.com.", "a..b.com"] {
            let err = auth.delegate("alice", bad).await.unwrap_err();
            assert!(err.is_validation_error(), "{bad}");
        }
        assert!(auth.delegate("", "example.com").await.unwrap_err().is_validation_error());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zone_key_layout() {
        let (store, auth) = authority();
        auth.delegate("alice", "Example.COM").await.unwrap();
        let raw = store.get("zone:example.com.").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["owner"], "alice");
    }

    #[tokio::test]
    async fn test_revoke_unclaimed_is_noop() {
        let (_, auth) = authority();
        auth.revoke("anyone", "example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_requires_delegated_zone() {
        let (_, auth) = authority();
        let err = auth
            .claim("bob", "www.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_claim_rejects_empty_ips() {
        let (_, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        assert!(auth
            .claim("alice", "www.example.com", &[])
            .await
            .unwrap_err()
            .is_validation_error());
    }

    #[tokio::test]
    async fn test_delegated_zone_only_owner_writes() {
        let (_, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        auth.claim("alice", "www.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap();
        assert!(auth
            .claim("bob", "api.example.com", &[ip("10.0.0.2")])
            .await
            .unwrap_err()
            .is_auth_error());
        assert!(auth
            .release("bob", "www.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap_err()
            .is_auth_error());
    }

    #[tokio::test]
    async fn test_two_label_name_uses_empty_label() {
        let (store, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        auth.claim("alice", "example.com", &[ip("10.0.0.1")])
            .await
            .unwrap();
        assert_eq!(store.hkeys("example.com.").await.unwrap(), vec![""]);
        assert_eq!(auth.records("example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_records_roundtrip_and_dedup() {
        let (store, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        let ips = [ip("10.1.1.10"), ip("2001:db8::1")];
        auth.claim("alice", "www.example.com", &ips).await.unwrap();
        auth.claim("alice", "www.example.com", &ips[..1]).await.unwrap();

        let set = auth.records("www.example.com").await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(RecordType::A).len(), 1);
        assert_eq!(set.get(RecordType::Aaaa).len(), 1);

        let raw = store.hget("example.com.", "www").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["a"][0]["ip"], "10.1.1.10");
        assert_eq!(value["a"][0]["ttl"], 3600);
        assert_eq!(value["aaaa"][0]["ip"], "2001:db8::1");
    }

    #[tokio::test]
    async fn test_ipv4_mapped_becomes_a_record() {
        let (_, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        auth.claim("alice", "www.example.com", &[ip("::ffff:10.0.0.9")])
            .await
            .unwrap();
        let set = auth.records("www.example.com").await.unwrap();
        assert_eq!(set.get(RecordType::A).len(), 1);
        assert!(set.get(RecordType::Aaaa).is_empty());
    }

    #[tokio::test]
    async fn test_self_managed_first_claim_and_free() {
        let (store, auth) = authority();
        auth.delegate(GATEWAY, "grid.example.com").await.unwrap();
        let ips = [ip("10.1.1.10")];

        auth.claim("bob", "bob.grid.example.com", &ips).await.unwrap();
        auth.claim("bob", "bob.grid.example.com", &[ip("10.1.1.11")])
            .await
            .unwrap();
        assert!(auth
            .claim("eve", "bob.grid.example.com", &ips)
            .await
            .unwrap_err()
            .is_auth_error());
        assert_eq!(
            store
                .hget(MANAGED_DOMAINS, "bob.grid.example.com")
                .await
                .unwrap(),
            Some(b"bob".to_vec())
        );

        // partial release keeps the claim
        auth.release("bob", "bob.grid.example.com", &ips).await.unwrap();
        assert!(auth
            .claim("eve", "bob.grid.example.com", &ips)
            .await
            .is_err());

        auth.release("bob", "bob.grid.example.com", &[ip("10.1.1.11")])
            .await
            .unwrap();
        assert_eq!(store.hkeys(MANAGED_DOMAINS).await.unwrap().len(), 0);
        assert!(store.hkeys("grid.example.com.").await.unwrap().is_empty());

        auth.claim("eve", "bob.grid.example.com", &ips).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_absent_is_noop() {
        let (_, auth) = authority();
        auth.release("bob", "x.nowhere.example", &[ip("10.0.0.1")])
            .await
            .unwrap();
        auth.delegate("alice", "example.com").await.unwrap();
        auth.release("alice", "www.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_keeps_foreign_records() {
        let (store, auth) = authority();
        auth.delegate("alice", "example.com").await.unwrap();
        store
            .hset(
                "example.com.",
                "mail",
                br#"{"a":[{"ip":"10.0.0.1","ttl":3600}],"mx":[{"host":"mx.example.com.","ttl":300}]}"#
                    .to_vec(),
            )
            .await
            .unwrap();
        auth.release("alice", "mail.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap();
        let raw = store.hget("example.com.", "mail").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.get("a").is_none());
        assert_eq!(value["mx"][0]["host"], "mx.example.com.");
    }

    #[tokio::test]
    async fn test_revoke_cascades() {
        let (store, auth) = authority();
        auth.delegate(GATEWAY, "grid.example.com").await.unwrap();
        auth.delegate(GATEWAY, "other.example.com").await.unwrap();
        auth.claim("bob", "bob.grid.example.com", &[ip("10.0.0.1")])
            .await
            .unwrap();
        auth.claim("eve", "eve.grid.example.com", &[ip("10.0.0.2")])
            .await
            .unwrap();
        auth.claim("bob", "bob.other.example.com", &[ip("10.0.0.3")])
            .await
            .unwrap();

        auth.revoke(GATEWAY, "grid.example.com").await.unwrap();

        assert_eq!(auth.zone_owner("grid.example.com").await.unwrap(), None);
        assert!(store.hkeys("grid.example.com.").await.unwrap().is_empty());
        assert_eq!(
            store.hkeys(MANAGED_DOMAINS).await.unwrap(),
            vec!["bob.other.example.com"]
        );
        assert_eq!(auth.labels("other.example.com").await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_release_matches_records_of_any_ttl() {
        let store = Arc::new(MemoryStore::new());
        let before = DomainAuthority::new(store.clone(), GATEWAY, 3600);
        let after = DomainAuthority::new(store.clone(), GATEWAY, 60);
        before.delegate(GATEWAY, "example.com").await.unwrap();
        let ips = [ip("1.2.3.4")];

        before.claim("alice", "www.example.com", &ips).await.unwrap();
        after.release("alice", "www.example.com", &ips).await.unwrap();

        assert!(after.records("www.example.com").await.unwrap().is_empty());
        let name: DomainName = "www.example.com".parse().unwrap();
        assert_eq!(after.claimant(&name).await.unwrap(), None);
        after.claim("eve", "www.example.com", &ips).await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_at_new_ttl_updates_in_place() {
        let store = Arc::new(MemoryStore::new());
        let before = DomainAuthority::new(store.clone(), "alice-gw", 3600);
        let after = DomainAuthority::new(store.clone(), "alice-gw", 60);
        before.delegate("alice", "example.com").await.unwrap();

        before.claim("alice", "www.example.com", &[ip("1.2.3.4")]).await.unwrap();
        after.claim("alice", "www.example.com", &[ip("1.2.3.4")]).await.unwrap();

        let set = after.records("www.example.com").await.unwrap();
        assert_eq!(set.get(RecordType::A).len(), 1);
        assert_eq!(set.get(RecordType::A)[0].ttl(), 60);
    }

    #[tokio::test]
    async fn test_failed_record_write_undoes_label_claim() {
        let store = Arc::new(RecordWrites {
            inner: MemoryStore::new(),
            mode: RecordWrite::Fail,
        });
        let auth = DomainAuthority::new(store.clone(), GATEWAY, 3600);
        auth.delegate(GATEWAY, "grid.example.com").await.unwrap();

        let err = auth
            .claim("bob", "bob.grid.example.com", &[ip("10.1.1.10")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Storage(_)));
        assert!(store.hkeys(MANAGED_DOMAINS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_existing_claim() {
        let store = Arc::new(RecordWrites {
            inner: MemoryStore::new(),
            mode: RecordWrite::Fail,
        });
        let auth = DomainAuthority::new(store.clone(), GATEWAY, 3600);
        auth.delegate(GATEWAY, "grid.example.com").await.unwrap();
        store
            .hset(MANAGED_DOMAINS, "bob.grid.example.com", b"bob".to_vec())
            .await
            .unwrap();

        assert!(auth
            .claim("bob", "bob.grid.example.com", &[ip("10.1.1.10")])
            .await
            .is_err());
        assert_eq!(
            store.hget(MANAGED_DOMAINS, "bob.grid.example.com").await.unwrap(),
            Some(b"bob".to_vec())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_still_completes_label_claim() {
        let store = Arc::new(RecordWrites {
            inner: MemoryStore::new(),
            mode: RecordWrite::Slow(Duration::from_secs(5)),
        });
        let auth = DomainAuthority::new(store.clone(), GATEWAY, 3600);
        auth.delegate(GATEWAY, "grid.example.com").await.unwrap();

        let addrs = [ip("10.1.1.10")];
        let call = auth.claim("bob", "bob.grid.example.com", &addrs);
        assert!(tokio::time::timeout(Duration::from_secs(1), call).await.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let name: DomainName = "bob.grid.example.com".parse().unwrap();
        assert_eq!(auth.claimant(&name).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(auth.records("bob.grid.example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_delegation_clears_leftovers() {
        let (store, auth) = authority();
        store
            .hset("example.com.", "www", br#"{"a":[{"ip":"10.0.0.1","ttl":3600}]}"#.to_vec())
            .await
            .unwrap();
        store
            .hset(MANAGED_DOMAINS, "www.example.com", b"mallory".to_vec())
            .await
            .unwrap();

        auth.delegate("bob", "example.com").await.unwrap();
        assert!(auth.labels("example.com").await.unwrap().is_empty());
        assert!(store.hkeys(MANAGED_DOMAINS).await.unwrap().is_empty());

        // re-delegating to the same owner keeps their records
        auth.claim("bob", "www.example.com", &[ip("10.0.0.2")]).await.unwrap();
        auth.delegate("bob", "example.com").await.unwrap();
        assert_eq!(auth.labels("example.com").await.unwrap(), vec!["www"]);
    }
}
