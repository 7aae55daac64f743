//! Ownership-gated configuration authorities.
//!
//! Each authority owns one slice of the shared store (or the tunnel device)
//! and enforces who may change it. They share no in-process state; two
//! gateway processes pointed at the same store see the same ownership.
//!
//! Every first-claim write is a compare-and-set against the value read for
//! the ownership check. A lost CAS re-runs the check against the fresh value,
//! at most [`CLAIM_ATTEMPTS`] times, after which the call fails with a
//! retryable storage error.

pub mod domain;
pub mod routing;
pub mod tunnel;

pub use domain::DomainAuthority;
pub use routing::{ReverseSecret, RoutingAuthority};
pub use tunnel::TunnelAuthority;

use gridgate_core::{GatewayError, Result};

/// Compare-and-set rounds before giving up on a contended key.
pub const CLAIM_ATTEMPTS: usize = 3;

fn contended(key: &str) -> GatewayError {
    GatewayError::Storage(format!(
        "gave up on '{key}' after {CLAIM_ATTEMPTS} concurrent updates"
    ))
}

fn require_user(user: &str) -> Result<()> {
    if user.is_empty() {
        return Err(GatewayError::validation("user cannot be empty"));
    }
    Ok(())
}
