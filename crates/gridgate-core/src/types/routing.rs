use serde::{Deserialize, Serialize};

/// How the TCP router reaches the backend for a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Dial `addr` on the given ports
    Forward {
        /// Backend address
        addr: String,
        /// Port for plain-text traffic, usually HTTP
        http_port: u16,
        /// Port for TLS traffic, usually HTTPS
        tls_port: u16,
    },
    /// Hand connections to a client-initiated tunnel identified by a secret
    Reverse {
        /// Shared secret, always prefixed with `<owner>:`
        client_secret: String,
    },
}

/// One routing table entry, keyed by domain in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ServiceRecord", into = "ServiceRecord")]
pub struct RoutingEntry {
    /// Identity that registered the domain
    pub owner: String,
    /// Backend selection
    pub route: Route,
}

impl RoutingEntry {
    /// Returns true if this entry is a reverse tunnel
    #[must_use]
    pub const fn is_reverse(&self) -> bool {
        matches!(self.route, Route::Reverse { .. })
    }
}

/// Flat service record as read by the TCP router.
///
/// A non-empty `clientsecret` selects the reverse variant.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ServiceRecord {
    #[serde(default)]
    addr: String,
    #[serde(default, rename = "clientsecret")]
    client_secret: String,
    #[serde(default, rename = "tlsport")]
    tls_port: u16,
    #[serde(default, rename = "httpport")]
    http_port: u16,
    #[serde(default)]
    user: String,
}

impl From<ServiceRecord> for RoutingEntry {
    fn from(rec: ServiceRecord) -> Self {
        let route = if rec.client_secret.is_empty() {
            Route::Forward {
                addr: rec.addr,
                http_port: rec.http_port,
                tls_port: rec.tls_port,
            }
        } else {
            Route::Reverse {
                client_secret: rec.client_secret,
            }
        };
        Self {
            owner: rec.user,
            route,
        }
    }
}

impl From<RoutingEntry> for ServiceRecord {
    fn from(entry: RoutingEntry) -> Self {
        match entry.route {
            Route::Forward {
                addr,
                http_port,
                tls_port,
            } => Self {
                addr,
                http_port,
                tls_port,
                user: entry.owner,
                ..Self::default()
            },
            Route::Reverse { client_secret } => Self {
                client_secret,
                user: entry.owner,
                ..Self::default()
            },
        }
    }
}
