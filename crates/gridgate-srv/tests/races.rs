//! Interleavings of concurrent ownership checks.
//!
//! [`GatedStore`] parks callers right after reading a chosen key, so two
//! operations can be forced to both pass their read before either writes.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

use gridgate_core::{RecordType, Route};
use gridgate_srv::crypto::StaticDirectory;
use gridgate_srv::{DomainAuthority, ReverseSecret, RoutingAuthority};
use gridgate_store::{ConfigStore, MemoryStore, StoreResult};
use x25519_dalek::StaticSecret;

struct Gate {
    key: String,
    field: Option<String>,
    remaining: usize,
    rounds: usize,
}

/// Memory store that blocks on a barrier after matching reads.
struct GatedStore {
    inner: MemoryStore,
    barrier: Arc<Barrier>,
    gate: Mutex<Option<Gate>>,
}

impl GatedStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            barrier: Arc::new(Barrier::new(2)),
            gate: Mutex::new(None),
        })
    }

    /// Park the next `remaining` reads of `key` (and `field`, for hashes).
    ///
    /// Each parked read waits on the barrier `rounds` times.
    fn arm(&self, key: &str, field: Option<&str>, remaining: usize, rounds: usize) {
        *self.gate.lock().unwrap() = Some(Gate {
            key: key.to_string(),
            field: field.map(str::to_string),
            remaining,
            rounds,
        });
    }

    async fn pass(&self, key: &str, field: Option<&str>) {
        let rounds = {
            let mut gate = self.gate.lock().unwrap();
            match gate.as_mut() {
                Some(g) if g.remaining > 0 && g.key == key && g.field.as_deref() == field => {
                    g.remaining -= 1;
                    g.rounds
                }
                _ => 0,
            }
        };
        for _ in 0..rounds {
            self.barrier.wait().await;
        }
    }
}

#[async_trait]
impl ConfigStore for GatedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.inner.get(key).await?;
        self.pass(key, None).await;
        Ok(value)
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
        let value = self.inner.hget(key, field).await?;
        self.pass(key, Some(field)).await;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
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

fn domains(store: &Arc<GatedStore>) -> DomainAuthority {
    DomainAuthority::new(store.clone(), "G", 3600)
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_concurrent_delegation_single_winner() {
    let store = GatedStore::new();
    let auth = domains(&store);
    store.arm("zone:example.com.", None, 2, 1);

    let (alice, bob) = tokio::join!(
        auth.delegate("alice", "example.com"),
        auth.delegate("bob", "example.com"),
    );

    assert!(alice.is_ok() != bob.is_ok(), "exactly one delegation must win");
    let loser = if alice.is_ok() { bob } else { alice };
    assert!(loser.unwrap_err().is_auth_error());

    let owner = auth.zone_owner("example.com").await.unwrap().unwrap();
    assert!(owner == "alice" || owner == "bob");
}

#[tokio::test]
async fn test_concurrent_same_user_delegation_both_succeed() {
    let store = GatedStore::new();
    let auth = domains(&store);
    store.arm("zone:example.com.", None, 2, 1);

    let (a, b) = tokio::join!(
        auth.delegate("alice", "example.com"),
        auth.delegate("alice", "example.com"),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(auth.zone_owner("example.com").await.unwrap().as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_concurrent_label_claim_single_winner() {
    let store = GatedStore::new();
    let auth = domains(&store);
    auth.delegate("G", "grid.example.com").await.unwrap();
    store.arm("managed_domains", Some("app.grid.example.com"), 2, 1);

    let bob_addrs = [ip("10.1.1.10")];
    let eve_addrs = [ip("10.1.1.20")];
    let (bob, eve) = tokio::join!(
        auth.claim("bob", "app.grid.example.com", &bob_addrs),
        auth.claim("eve", "app.grid.example.com", &eve_addrs),
    );

    assert!(bob.is_ok() != eve.is_ok(), "exactly one label claim must win");
    let (winner, winner_ip, loser) = if bob.is_ok() {
        ("bob", "10.1.1.10", eve)
    } else {
        ("eve", "10.1.1.20", bob)
    };
    assert!(loser.unwrap_err().is_auth_error());

    let claimant = auth
        .claimant(&"app.grid.example.com".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(claimant.as_deref(), Some(winner));

    let records = auth.records("app.grid.example.com").await.unwrap();
    let a = records.get(RecordType::A);
    assert_eq!(a.len(), 1);
    assert!(a[0].to_string().contains(winner_ip));
}

#[tokio::test]
async fn test_concurrent_route_registration_single_winner() {
    let store = GatedStore::new();
    let routes = RoutingAuthority::new(
        store.clone(),
        Arc::new(StaticDirectory::new()),
        StaticSecret::from([9; 32]),
    );
    store.arm("routing:app.example.com", None, 2, 1);

    let (alice, bob) = tokio::join!(
        routes.register_forward("alice", "app.example.com", "10.0.0.1", 80, 443),
        routes.register_reverse(
            "bob",
            "app.example.com",
            ReverseSecret::Plain("bob:s3cret".into())
        ),
    );

    assert!(alice.is_ok() != bob.is_ok(), "exactly one registration must win");
    let entry = routes.entry("app.example.com").await.unwrap().unwrap();
    if alice.is_ok() {
        assert!(bob.unwrap_err().is_auth_error());
        assert_eq!(entry.owner, "alice");
        assert!(matches!(entry.route, Route::Forward { .. }));
    } else {
        assert!(alice.unwrap_err().is_auth_error());
        assert_eq!(entry.owner, "bob");
        assert!(entry.is_reverse());
    }
}

/// Record sets are read-modify-write on one hash field without a condition.
/// Two claims by the zone owner that both read the old set each write their
/// own union, and the later write drops the other's address.
#[tokio::test]
async fn test_same_owner_record_union_loses_update() {
    let store = GatedStore::new();
    let auth = domains(&store);
    auth.delegate("alice", "example.com").await.unwrap();
    store.arm("example.com.", Some("www"), 2, 1);

    let a_addrs = [ip("10.0.0.1")];
    let b_addrs = [ip("10.0.0.2")];
    let (a, b) = tokio::join!(
        auth.claim("alice", "www.example.com", &a_addrs),
        auth.claim("alice", "www.example.com", &b_addrs),
    );
    a.unwrap();
    b.unwrap();

    let records = auth.records("www.example.com").await.unwrap();
    assert_eq!(records.get(RecordType::A).len(), 1);

    // retrying after the race converges
    auth.claim("alice", "www.example.com", &[ip("10.0.0.1"), ip("10.0.0.2")])
        .await
        .unwrap();
    let records = auth.records("www.example.com").await.unwrap();
    assert_eq!(records.get(RecordType::A).len(), 2);
}

/// A claim that passed its zone check before a revoke writes its records
/// after the revoke cleared the zone, leaving them behind until the zone is
/// delegated again.
#[tokio::test]
async fn test_claim_racing_revoke_leaves_records() {
    let store = GatedStore::new();
    let auth = domains(&store);
    auth.delegate("alice", "example.com").await.unwrap();
    store.arm("zone:example.com.", None, 1, 2);

    let barrier = store.barrier.clone();
    let revoker = auth.clone();
    let addrs = [ip("10.0.0.1")];
    let (claim, revoke) = tokio::join!(
        auth.claim("alice", "www.example.com", &addrs),
        async {
            barrier.wait().await;
            let result = revoker.revoke("alice", "example.com").await;
            barrier.wait().await;
            result
        },
    );
    claim.unwrap();
    revoke.unwrap();

    assert_eq!(auth.zone_owner("example.com").await.unwrap(), None);
    assert_eq!(auth.labels("example.com").await.unwrap(), vec!["www"]);

    // the next owner does not inherit them
    auth.delegate("bob", "example.com").await.unwrap();
    assert!(auth.labels("example.com").await.unwrap().is_empty());
    assert!(auth.records("www.example.com").await.unwrap().is_empty());
}
