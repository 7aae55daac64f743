//! Routing authority: per-domain TCP router services.
//!
//! One service record per domain under `routing:<domain>`, wrapped in the
//! router's envelope `{"Key": <store key>, "Value": base64(json(service))}`.
//! The first user to register a domain owns it until they deregister;
//! ownership here is independent of DNS delegation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use x25519_dalek::StaticSecret;

use gridgate_core::{DomainName, GatewayError, Result, Route, RoutingEntry};
use gridgate_store::ConfigStore;

use super::{contended, require_user, CLAIM_ATTEMPTS};
use crate::crypto::{open_secret, IdentityDirectory};

/// Store key of the service record for `domain`
pub fn routing_key(domain: &DomainName) -> String {
    format!("routing:{domain}")
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Wrap an entry in the router envelope
pub fn encode_entry(key: &str, entry: &RoutingEntry) -> Result<Vec<u8>> {
    let service = serde_json::to_vec(entry)?;
    Ok(serde_json::to_vec(&Envelope {
        key: key.to_string(),
        value: STANDARD.encode(service),
    })?)
}

/// Unwrap an entry from the router envelope
pub fn decode_entry(raw: &[u8]) -> Result<RoutingEntry> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    let service = STANDARD
        .decode(envelope.value)
        .map_err(|e| GatewayError::Storage(format!("corrupt routing envelope: {e}")))?;
    Ok(serde_json::from_slice(&service)?)
}

/// Client secret of a reverse tunnel as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseSecret {
    /// Already plain text
    Plain(String),
    /// Hex ciphertext sealed to the gateway by the requester
    Encrypted(String),
}

/// TCP router service registration.
#[derive(Clone)]
pub struct RoutingAuthority {
    store: Arc<dyn ConfigStore>,
    directory: Arc<dyn IdentityDirectory>,
    secret: StaticSecret,
}

impl RoutingAuthority {
    /// `secret` is the gateway X25519 secret used to open encrypted client secrets
    pub fn new(
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn IdentityDirectory>,
        secret: StaticSecret,
    ) -> Self {
        Self {
            store,
            directory,
            secret,
        }
    }

    /// Current entry for `domain`
    pub async fn entry(&self, domain: &str) -> Result<Option<RoutingEntry>> {
        let domain = DomainName::parse(domain)?;
        match self.store.get(&routing_key(&domain)).await? {
            Some(raw) => decode_entry(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Forward `domain` to `addr`.
    ///
    /// Overwrites the caller's own entry; someone else's is refused.
    pub async fn register_forward(
        &self,
        user: &str,
        domain: &str,
        addr: &str,
        http_port: u16,
        tls_port: u16,
    ) -> Result<()> {
        require_user(user)?;
        let domain = DomainName::parse(domain)?;
        if addr.is_empty() {
            return Err(GatewayError::validation("proxy address cannot be empty"));
        }
        let entry = RoutingEntry {
            owner: user.to_string(),
            route: Route::Forward {
                addr: addr.to_string(),
                http_port,
                tls_port,
            },
        };
        self.claim(user, &domain, &entry).await?;
        info!(user, domain = %domain, addr, http_port, tls_port, "forward proxy registered");
        Ok(())
    }

    /// Route `domain` to the reverse tunnel identified by `secret`.
    ///
    /// The plain secret must start with `<user>:`.
    pub async fn register_reverse(
        &self,
        user: &str,
        domain: &str,
        secret: ReverseSecret,
    ) -> Result<()> {
        require_user(user)?;
        let domain = DomainName::parse(domain)?;
        let client_secret = match secret {
            ReverseSecret::Plain(s) => s,
            ReverseSecret::Encrypted(hex) => {
                if hex.is_empty() {
                    return Err(GatewayError::validation("secret cannot be empty"));
                }
                let peer = self.directory.fetch_public_key(user).await?;
                open_secret(&hex, &self.secret, &peer)?
            }
        };
        if client_secret.is_empty() {
            return Err(GatewayError::validation("secret cannot be empty"));
        }
        if !client_secret.starts_with(&format!("{user}:")) {
            warn!(user, domain = %domain, "reverse proxy secret not bound to user");
            return Err(GatewayError::validation(
                "secret must follow the format '<user>:<random>'",
            ));
        }

        let entry = RoutingEntry {
            owner: user.to_string(),
            route: Route::Reverse { client_secret },
        };
        self.claim(user, &domain, &entry).await?;
        info!(user, domain = %domain, "reverse proxy registered");
        Ok(())
    }

    async fn claim(&self, user: &str, domain: &DomainName, entry: &RoutingEntry) -> Result<()> {
        let key = routing_key(domain);
        let value = encode_entry(&key, entry)?;
        for _ in 0..CLAIM_ATTEMPTS {
            let current = self.store.get(&key).await?;
            if let Some(raw) = &current {
                let existing = decode_entry(raw)?;
                if existing.owner != user {
                    warn!(user, domain = %domain, owner = %existing.owner, "domain already routed");
                    return Err(GatewayError::unauthorized("add proxy from", domain.as_str()));
                }
            }
            if self
                .store
                .compare_and_set(&key, current.as_deref(), Some(value.clone()))
                .await?
            {
                return Ok(());
            }
            debug!(domain = %domain, "routing entry changed during registration, re-checking");
        }
        Err(contended(&key))
    }

    /// Remove the service record for `domain`; absent entries are a no-op
    pub async fn deregister(&self, user: &str, domain: &str) -> Result<()> {
        require_user(user)?;
        let domain = DomainName::parse(domain)?;
        let key = routing_key(&domain);
        for _ in 0..CLAIM_ATTEMPTS {
            let Some(raw) = self.store.get(&key).await? else {
                debug!(user, domain = %domain, "no routing entry to remove");
                return Ok(());
            };
            let existing = decode_entry(&raw)?;
            if existing.owner != user {
                warn!(user, domain = %domain, owner = %existing.owner, "deregistration rejected");
                return Err(GatewayError::unauthorized("remove proxy from", domain.as_str()));
            }
            if self.store.compare_and_set(&key, Some(&raw), None).await? {
                info!(user, domain = %domain, "routing entry removed");
                return Ok(());
            }
        }
        Err(contended(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{seal_secret, StaticDirectory};
    use gridgate_store::MemoryStore;
    use x25519_dalek::PublicKey;

    const GATEWAY_SEED: [u8; 32] = [1; 32];
    const ALICE_SEED: [u8; 32] = [2; 32];

    fn authority() -> (Arc<MemoryStore>, RoutingAuthority) {
        let store = Arc::new(MemoryStore::new());
        let mut dir = StaticDirectory::new();
        dir.insert("alice", PublicKey::from(&StaticSecret::from(ALICE_SEED)));
        let auth = RoutingAuthority::new(
            store.clone(),
            Arc::new(dir),
            StaticSecret::from(GATEWAY_SEED),
        );
        (store, auth)
    }

    #[tokio::test]
    async fn test_forward_first_claim() {
        let (_, auth) = authority();
        auth.register_forward("alice", "app.example.com", "10.0.0.5", 80, 443)
            .await
            .unwrap();
        // owner may overwrite
        auth.register_forward("alice", "app.example.com", "10.0.0.6", 8080, 8443)
            .await
            .unwrap();
        let err = auth
            .register_forward("bob", "app.example.com", "10.9.9.9", 80, 443)
            .await
            .unwrap_err();
        assert!(err.is_auth_error());

        let entry = auth.entry("app.example.com").await.unwrap().unwrap();
        assert_eq!(entry.owner, "alice");
        assert_eq!(
            entry.route,
            Route::Forward {
                addr: "10.0.0.6".into(),
                http_port: 8080,
                tls_port: 8443
            }
        );
    }

    #[tokio::test]
    async fn test_envelope_layout() {
        let (store, auth) = authority();
        auth.register_forward("alice", "app.example.com", "10.0.0.5", 80, 443)
            .await
            .unwrap();
        let raw = store.get("routing:app.example.com").await.unwrap().unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(envelope["Key"], "routing:app.example.com");

        let service = STANDARD
            .decode(envelope["Value"].as_str().unwrap())
            .unwrap();
        let service: serde_json::Value = serde_json::from_slice(&service).unwrap();
        assert_eq!(service["addr"], "10.0.0.5");
        assert_eq!(service["httpport"], 80);
        assert_eq!(service["tlsport"], 443);
        assert_eq!(service["user"], "alice");
    }

    #[tokio::test]
    async fn test_reverse_secret_binding() {
        let (_, auth) = authority();
        auth.register_reverse(
            "alice",
            "tunnel.example.com",
            ReverseSecret::Plain("alice:abc123".into()),
        )
        .await
        .unwrap();
        let err = auth
            .register_reverse(
                "alice",
                "other.example.com",
                ReverseSecret::Plain("mallory:abc123".into()),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
        // prefix must include the separator
        assert!(auth
            .register_reverse(
                "alice",
                "other.example.com",
                ReverseSecret::Plain("aliceabc".into()),
            )
            .await
            .is_err());
        assert!(auth.entry("other.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reverse_encrypted_secret() {
        let (_, auth) = authority();
        let gateway_public = PublicKey::from(&StaticSecret::from(GATEWAY_SEED));
        let sealed = seal_secret(
            "alice:s3cret",
            &StaticSecret::from(ALICE_SEED),
            &gateway_public,
        )
        .unwrap();

        auth.register_reverse("alice", "tunnel.example.com", ReverseSecret::Encrypted(sealed))
            .await
            .unwrap();
        let entry = auth.entry("tunnel.example.com").await.unwrap().unwrap();
        assert!(entry.is_reverse());
        assert_eq!(
            entry.route,
            Route::Reverse {
                client_secret: "alice:s3cret".into()
            }
        );
    }

    #[tokio::test]
    async fn test_reverse_undecryptable_secret() {
        let (_, auth) = authority();
        let err = auth
            .register_reverse(
                "alice",
                "tunnel.example.com",
                ReverseSecret::Encrypted("00112233445566778899aabbccddeeff00112233445566778899".into()),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        // no key on file for bob
        let err = auth
            .register_reverse(
                "bob",
                "tunnel.example.com",
                ReverseSecret::Encrypted("00ff".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_deregister() {
        let (store, auth) = authority();
        auth.deregister("alice", "app.example.com").await.unwrap();

        auth.register_forward("alice", "app.example.com", "10.0.0.5", 80, 443)
            .await
            .unwrap();
        assert!(auth
            .deregister("bob", "app.example.com")
            .await
            .unwrap_err()
            .is_auth_error());
        auth.deregister("alice", "app.example.com").await.unwrap();
        assert!(store.is_empty());

        // freed for anyone
        auth.register_forward("bob", "app.example.com", "10.9.9.9", 80, 443)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_routing_independent_of_delegation() {
        let (store, auth) = authority();
        store
            .set("zone:example.com.", br#"{"owner":"carol"}"#.to_vec())
            .await
            .unwrap();
        auth.register_forward("alice", "example.com", "10.0.0.5", 80, 443)
            .await
            .unwrap();
    }
}
