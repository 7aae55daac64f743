//! Where user public keys come from.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use x25519_dalek::PublicKey;

use gridgate_core::{GatewayError, Result};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lookup of a user's X25519 public key.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Fetch the public key registered for `user`.
    ///
    /// Unknown users are [`GatewayError::NotFound`].
    async fn fetch_public_key(&self, user: &str) -> Result<PublicKey>;
}

/// Parse a hex-encoded 32-byte public key
pub fn parse_public_key(text: &str) -> Result<PublicKey> {
    let raw = hex::decode(text.trim())
        .map_err(|e| GatewayError::Directory(format!("invalid public key hex: {e}")))?;
    let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
        GatewayError::Directory(format!("public key must be 32 bytes, got {}", v.len()))
    })?;
    Ok(PublicKey::from(bytes))
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    keys: HashMap<String, PublicKey>,
}

impl StaticDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `user -> hex key` pairs
    pub fn from_hex<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Result<Self> {
        let mut dir = Self::new();
        for (user, key) in entries {
            dir.insert(user.clone(), parse_public_key(key)?);
        }
        Ok(dir)
    }

    /// Register or replace a user's key
    pub fn insert(&mut self, user: impl Into<String>, key: PublicKey) {
        self.keys.insert(user.into(), key);
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn fetch_public_key(&self, user: &str) -> Result<PublicKey> {
        self.keys
            .get(user)
            .copied()
            .ok_or_else(|| GatewayError::NotFound {
                resource: format!("public key of user {user}"),
            })
    }
}

#[derive(Deserialize)]
struct UserRecord {
    pkey: String,
}

/// Directory backed by the grid explorer's `/users/{id}` endpoint.
#[derive(Debug, Clone)]
pub struct ExplorerDirectory {
    http: HttpClient,
    base_url: Url,
}

impl ExplorerDirectory {
    /// Client for the explorer at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Config(format!("invalid explorer url '{base_url}': {e}")))?;
        let http = HttpClient::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(format!("gridgate/{}", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn user_url(&self, user: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Config(format!("explorer url '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("users")
            .push(user);
        Ok(url)
    }
}

#[async_trait]
impl IdentityDirectory for ExplorerDirectory {
    async fn fetch_public_key(&self, user: &str) -> Result<PublicKey> {
        let url = self.user_url(user)?;
        debug!(url = %url, "GET request");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Directory(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                resource: format!("user {user}"),
            });
        }
        if !status.is_success() {
            warn!(user, status = status.as_u16(), "explorer lookup failed");
            return Err(GatewayError::Directory(format!(
                "explorer returned {status} for user {user}"
            )));
        }

        let record: UserRecord = response
            .json()
            .await
            .map_err(|e| GatewayError::Directory(format!("invalid user record: {e}")))?;
        parse_public_key(&record.pkey)
    }
}
